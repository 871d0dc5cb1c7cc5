//! Job board models

pub mod vacancy;

pub use vacancy::{Candidate, NewVacancy, Vacancy, VacancyFields, VacancyForm, parse_skills};
