//! Application state shared across handlers

use std::sync::Arc;

use auth::{
    LocalPasswordVerifier, PasswordResetService, ResetMailer, SessionAuthenticator,
    SessionManager, SessionStore, UserStore,
};
use mockable::Clock;

use crate::{config::Settings, repositories::VacancyStore, upload::UploadConfig};

/// Upload rules for each kind of file the board accepts
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub resumes: UploadConfig,
    pub profile_images: UploadConfig,
}

impl UploadSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            resumes: UploadConfig::resume(settings.resume_dir()),
            profile_images: UploadConfig::profile_image(settings.profile_image_dir()),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub vacancies: VacancyStore,
    pub sessions: SessionManager,
    pub authenticator: SessionAuthenticator,
    pub password_reset: Arc<PasswordResetService>,
    pub uploads: Arc<UploadSettings>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        users: UserStore,
        vacancies: VacancyStore,
        session_store: Arc<dyn SessionStore>,
        mailer: Arc<dyn ResetMailer>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let sessions = SessionManager::new(
            session_store,
            clock.clone(),
            settings.session_ttl(),
            settings.cookie_secure,
        );
        let authenticator =
            SessionAuthenticator::new(Arc::new(LocalPasswordVerifier::new(users.clone())));
        let password_reset = PasswordResetService::new(users.clone(), mailer, clock);

        Self {
            uploads: Arc::new(UploadSettings::from_settings(&settings)),
            users,
            vacancies,
            sessions,
            authenticator,
            password_reset: Arc::new(password_reset),
            settings: Arc::new(settings),
        }
    }
}
