//! Repositories for database operations

pub mod vacancy;

pub use vacancy::{
    InMemoryVacancyRepository, PgVacancyRepository, VacancyRepository, VacancyStore, search_terms,
};
