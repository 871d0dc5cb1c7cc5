//! Vacancy url slugs
//!
//! Slugs are non-empty identifiers composed of lowercase ASCII letters,
//! digits, and hyphens. A vacancy url is the slugified title followed by a
//! short random suffix so two vacancies with the same title stay distinct.

use rand::{Rng, distributions::Alphanumeric};

/// Length of the random suffix appended to every vacancy url
pub const SUFFIX_LEN: usize = 7;

/// Lowercase `title`, replacing every run of other characters with one hyphen
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for ch in title.chars().map(fold_accent) {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

// Common Latin accents map to their base letter; anything else passes through.
fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        other => other,
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Url for a new vacancy titled `title`
pub fn vacancy_url(title: &str) -> String {
    let base = slugify(title);
    if base.is_empty() {
        random_suffix()
    } else {
        format!("{}-{}", base, random_suffix())
    }
}

/// Return `true` when `value` is a well-formed slug
pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}
