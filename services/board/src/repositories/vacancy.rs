//! Vacancy repository for database operations

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::error::{RepositoryError, RepositoryResult};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::{Candidate, NewVacancy, Vacancy, VacancyFields};

/// Storage abstraction for vacancies and their candidate lists
#[async_trait]
pub trait VacancyRepository: Send + Sync {
    /// Newest first
    async fn list_recent(&self) -> RepositoryResult<Vec<Vacancy>>;

    async fn list_by_author(&self, author_id: Uuid) -> RepositoryResult<Vec<Vacancy>>;

    /// Insert a vacancy; a taken url yields `RepositoryError::Conflict`
    async fn create(&self, new_vacancy: &NewVacancy) -> RepositoryResult<Vacancy>;

    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Vacancy>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Vacancy>>;

    /// Overwrite every editable field of the vacancy at `url`
    async fn replace(&self, url: &str, fields: &VacancyFields)
    -> RepositoryResult<Option<Vacancy>>;

    /// Returns `false` when nothing was deleted
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Append to the candidate list in a single write.
    ///
    /// Returns `false` when no vacancy has that url.
    async fn append_candidate(&self, url: &str, candidate: &Candidate) -> RepositoryResult<bool>;

    /// Vacancies matching any of the words in `query`
    async fn search(&self, query: &str) -> RepositoryResult<Vec<Vacancy>>;
}

/// Shared handle on a vacancy repository
pub type VacancyStore = Arc<dyn VacancyRepository>;

/// Lowercased words of a search phrase; punctuation separates words
pub fn search_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// Stored in `search_text` so the tsvector holds exactly the words a query is split into.
fn indexed_text(fields: &VacancyFields) -> String {
    search_terms(&fields.search_text()).join(" ")
}

const VACANCY_COLUMNS: &str = "id, url, title, company, location, salary, contract_type, \
                               description, skills, author_id, candidates, created_at";

fn vacancy_from_row(row: &PgRow) -> Vacancy {
    Vacancy {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        company: row.get("company"),
        location: row.get("location"),
        salary: row.get("salary"),
        contract_type: row.get("contract_type"),
        description: row.get("description"),
        skills: row.get("skills"),
        author_id: row.get("author_id"),
        candidates: row.get::<Json<Vec<Candidate>>, _>("candidates").0,
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL vacancy repository
#[derive(Clone)]
pub struct PgVacancyRepository {
    pool: PgPool,
}

impl PgVacancyRepository {
    /// Create a new vacancy repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VacancyRepository for PgVacancyRepository {
    async fn list_recent(&self) -> RepositoryResult<Vec<Vacancy>> {
        let rows = sqlx::query(&format!(
            "SELECT {VACANCY_COLUMNS} FROM vacancies ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(rows.iter().map(vacancy_from_row).collect())
    }

    async fn list_by_author(&self, author_id: Uuid) -> RepositoryResult<Vec<Vacancy>> {
        let rows = sqlx::query(&format!(
            "SELECT {VACANCY_COLUMNS} FROM vacancies WHERE author_id = $1 ORDER BY created_at DESC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(rows.iter().map(vacancy_from_row).collect())
    }

    async fn create(&self, new_vacancy: &NewVacancy) -> RepositoryResult<Vacancy> {
        info!("Creating vacancy: {}", new_vacancy.url);
        let fields = &new_vacancy.fields;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO vacancies
                (url, title, company, location, salary, contract_type, description, skills,
                 author_id, search_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {VACANCY_COLUMNS}
            "#
        ))
        .bind(&new_vacancy.url)
        .bind(&fields.title)
        .bind(&fields.company)
        .bind(&fields.location)
        .bind(fields.salary.as_deref())
        .bind(&fields.contract_type)
        .bind(fields.description.as_deref())
        .bind(&fields.skills)
        .bind(new_vacancy.author_id)
        .bind(indexed_text(fields))
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(vacancy_from_row(&row))
    }

    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Vacancy>> {
        let row = sqlx::query(&format!(
            "SELECT {VACANCY_COLUMNS} FROM vacancies WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(row.as_ref().map(vacancy_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Vacancy>> {
        let row = sqlx::query(&format!(
            "SELECT {VACANCY_COLUMNS} FROM vacancies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(row.as_ref().map(vacancy_from_row))
    }

    async fn replace(
        &self,
        url: &str,
        fields: &VacancyFields,
    ) -> RepositoryResult<Option<Vacancy>> {
        info!("Updating vacancy: {}", url);

        let row = sqlx::query(&format!(
            r#"
            UPDATE vacancies
            SET title = $2, company = $3, location = $4, salary = $5, contract_type = $6,
                description = $7, skills = $8, search_text = $9
            WHERE url = $1
            RETURNING {VACANCY_COLUMNS}
            "#
        ))
        .bind(url)
        .bind(&fields.title)
        .bind(&fields.company)
        .bind(&fields.location)
        .bind(fields.salary.as_deref())
        .bind(&fields.contract_type)
        .bind(fields.description.as_deref())
        .bind(&fields.skills)
        .bind(indexed_text(fields))
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(row.as_ref().map(vacancy_from_row))
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        info!("Deleting vacancy: {}", id);

        let result = sqlx::query("DELETE FROM vacancies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_query)?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_candidate(&self, url: &str, candidate: &Candidate) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE vacancies
            SET candidates = candidates || jsonb_build_array($2::jsonb)
            WHERE url = $1
            "#,
        )
        .bind(url)
        .bind(Json(candidate))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, query: &str) -> RepositoryResult<Vec<Vacancy>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {VACANCY_COLUMNS}
            FROM vacancies
            WHERE search_document @@ to_tsquery('simple', $1)
            ORDER BY ts_rank(search_document, to_tsquery('simple', $1)) DESC, created_at DESC
            "#
        ))
        .bind(terms.join(" | "))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(rows.iter().map(vacancy_from_row).collect())
    }
}

/// In-process vacancy repository, used by tests and the `memory` backend
#[derive(Default)]
pub struct InMemoryVacancyRepository {
    vacancies: RwLock<Vec<Vacancy>>,
}

impl InMemoryVacancyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut vacancies: Vec<Vacancy>) -> Vec<Vacancy> {
    vacancies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    vacancies
}

#[async_trait]
impl VacancyRepository for InMemoryVacancyRepository {
    async fn list_recent(&self) -> RepositoryResult<Vec<Vacancy>> {
        Ok(newest_first(self.vacancies.read().await.clone()))
    }

    async fn list_by_author(&self, author_id: Uuid) -> RepositoryResult<Vec<Vacancy>> {
        let vacancies = self.vacancies.read().await;
        Ok(newest_first(
            vacancies
                .iter()
                .filter(|v| v.author_id == Some(author_id))
                .cloned()
                .collect(),
        ))
    }

    async fn create(&self, new_vacancy: &NewVacancy) -> RepositoryResult<Vacancy> {
        let mut vacancies = self.vacancies.write().await;
        if vacancies.iter().any(|v| v.url == new_vacancy.url) {
            return Err(RepositoryError::Conflict("vacancies_url_key".to_string()));
        }

        let fields = new_vacancy.fields.clone();
        let vacancy = Vacancy {
            id: Uuid::new_v4(),
            url: new_vacancy.url.clone(),
            title: fields.title,
            company: fields.company,
            location: fields.location,
            salary: fields.salary,
            contract_type: fields.contract_type,
            description: fields.description,
            skills: fields.skills,
            author_id: Some(new_vacancy.author_id),
            candidates: Vec::new(),
            created_at: Utc::now(),
        };
        vacancies.push(vacancy.clone());
        Ok(vacancy)
    }

    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Vacancy>> {
        let vacancies = self.vacancies.read().await;
        Ok(vacancies.iter().find(|v| v.url == url).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Vacancy>> {
        let vacancies = self.vacancies.read().await;
        Ok(vacancies.iter().find(|v| v.id == id).cloned())
    }

    async fn replace(
        &self,
        url: &str,
        fields: &VacancyFields,
    ) -> RepositoryResult<Option<Vacancy>> {
        let mut vacancies = self.vacancies.write().await;
        let Some(vacancy) = vacancies.iter_mut().find(|v| v.url == url) else {
            return Ok(None);
        };

        let fields = fields.clone();
        vacancy.title = fields.title;
        vacancy.company = fields.company;
        vacancy.location = fields.location;
        vacancy.salary = fields.salary;
        vacancy.contract_type = fields.contract_type;
        vacancy.description = fields.description;
        vacancy.skills = fields.skills;
        Ok(Some(vacancy.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut vacancies = self.vacancies.write().await;
        let before = vacancies.len();
        vacancies.retain(|v| v.id != id);
        Ok(vacancies.len() < before)
    }

    async fn append_candidate(&self, url: &str, candidate: &Candidate) -> RepositoryResult<bool> {
        let mut vacancies = self.vacancies.write().await;
        match vacancies.iter_mut().find(|v| v.url == url) {
            Some(vacancy) => {
                vacancy.candidates.push(candidate.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search(&self, query: &str) -> RepositoryResult<Vec<Vacancy>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let vacancies = self.vacancies.read().await;
        let matches = vacancies
            .iter()
            .filter(|v| {
                let words = search_terms(&v.fields().search_text());
                terms.iter().any(|term| words.contains(term))
            })
            .cloned()
            .collect();
        Ok(newest_first(matches))
    }
}
