//! Vacancy model and form handling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job posting owned by one author
#[derive(Debug, Clone, Serialize)]
pub struct Vacancy {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub contract_type: String,
    pub description: Option<String>,
    pub skills: Vec<String>,
    pub author_id: Option<Uuid>,
    /// Only the author gets to see applicants
    #[serde(skip_serializing)]
    pub candidates: Vec<Candidate>,
    pub created_at: DateTime<Utc>,
}

impl Vacancy {
    pub fn fields(&self) -> VacancyFields {
        VacancyFields {
            title: self.title.clone(),
            company: self.company.clone(),
            location: self.location.clone(),
            salary: self.salary.clone(),
            contract_type: self.contract_type.clone(),
            description: self.description.clone(),
            skills: self.skills.clone(),
        }
    }
}

/// A résumé submission attached to a vacancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub email: String,
    /// Stored file name of the uploaded résumé
    pub resume: String,
}

/// Validated vacancy content, written as a whole on create and on edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VacancyFields {
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub contract_type: String,
    pub description: Option<String>,
    pub skills: Vec<String>,
}

impl VacancyFields {
    /// Text indexed for full-text search
    pub fn search_text(&self) -> String {
        let mut parts = vec![
            self.title.as_str(),
            self.company.as_str(),
            self.location.as_str(),
            self.contract_type.as_str(),
        ];
        if let Some(description) = &self.description {
            parts.push(description);
        }
        parts.extend(self.skills.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// New vacancy creation payload
#[derive(Debug, Clone)]
pub struct NewVacancy {
    pub url: String,
    pub author_id: Uuid,
    pub fields: VacancyFields,
}

/// Vacancy form as posted by the browser
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VacancyForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub description: String,
    /// Comma separated list, e.g. `"go,rust,ts"`
    #[serde(default)]
    pub skills: String,
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl VacancyForm {
    /// Check required fields and produce the values to store
    pub fn validate(&self) -> Result<VacancyFields, Vec<String>> {
        let mut errors = Vec::new();
        let required = [
            (&self.title, "Add a title to the vacancy"),
            (&self.company, "Add a company"),
            (&self.location, "Add a location"),
            (&self.contract_type, "Select the contract type"),
        ];
        for (value, message) in required {
            if value.trim().is_empty() {
                errors.push(message.to_string());
            }
        }

        let skills = parse_skills(&self.skills);
        if skills.is_empty() {
            errors.push("Add at least one skill".to_string());
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(VacancyFields {
            title: self.title.trim().to_string(),
            company: self.company.trim().to_string(),
            location: self.location.trim().to_string(),
            salary: optional(&self.salary),
            contract_type: self.contract_type.trim().to_string(),
            description: optional(&self.description),
            skills,
        })
    }
}

/// Split a comma separated skill list, keeping order and dropping blanks
pub fn parse_skills(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|skill| !skill.is_empty())
        .map(str::to_string)
        .collect()
}
