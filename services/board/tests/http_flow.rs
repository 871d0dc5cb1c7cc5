//! End-to-end request flows against the in-memory backends

use std::sync::Arc;

use auth::{
    InMemoryUserRepository, LogMailer, UserRepository,
    models::{NewUser, User},
    password::hash_password,
    session::InMemorySessionStore,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use board::{
    AppState, SessionBackend, Settings, create_router,
    models::{NewVacancy, Vacancy, VacancyFields, parse_skills},
    repositories::{InMemoryVacancyRepository, VacancyRepository},
};
use mockable::DefaultClock;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "devjobs-test-boundary";

struct TestApp {
    router: Router,
    users: Arc<InMemoryUserRepository>,
    vacancies: Arc<InMemoryVacancyRepository>,
    uploads: TempDir,
    cookie: Option<String>,
}

impl TestApp {
    fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let settings = Settings {
            session_backend: SessionBackend::Memory,
            upload_dir: uploads.path().to_path_buf(),
            ..Settings::default()
        };
        let users = Arc::new(InMemoryUserRepository::new());
        let vacancies = Arc::new(InMemoryVacancyRepository::new());

        let state = AppState::new(
            settings,
            users.clone(),
            vacancies.clone(),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(LogMailer),
            Arc::new(DefaultClock),
        );

        Self {
            router: create_router(state),
            users,
            vacancies,
            uploads,
            cookie: None,
        }
    }

    async fn send(&mut self, mut request: Request<Body>) -> Response<Body> {
        if let Some(cookie) = &self.cookie {
            request.headers_mut().insert(
                header::COOKIE,
                format!("devjobs.sid={cookie}").parse().unwrap(),
            );
        }

        let response = self.router.clone().oneshot(request).await.unwrap();

        for value in response.headers().get_all(header::SET_COOKIE) {
            let value = value.to_str().unwrap();
            if let Some(rest) = value.strip_prefix("devjobs.sid=") {
                let id = rest.split(';').next().unwrap_or_default();
                self.cookie = (!id.is_empty()).then(|| id.to_string());
            }
        }
        response
    }

    async fn get(&mut self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn delete(&mut self, uri: &str) -> Response<Body> {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_form(&mut self, uri: &str, body: &str) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn post_multipart(
        &mut self,
        uri: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, Vec<u8>)>,
    ) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(fields, file)))
                .unwrap(),
        )
        .await
    }

    async fn seed_user(&self, name: &str, email: &str, password: &str) -> User {
        self.users
            .create(&NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password).unwrap(),
            })
            .await
            .unwrap()
    }

    async fn seed_vacancy(&self, author_id: Uuid, title: &str) -> Vacancy {
        self.vacancies
            .create(&NewVacancy {
                url: format!("{}-abc1234", title.to_lowercase().replace(' ', "-")),
                author_id,
                fields: VacancyFields {
                    title: title.to_string(),
                    company: "Ferris Inc".to_string(),
                    location: "Remote".to_string(),
                    salary: Some("100k".to_string()),
                    contract_type: "Full time".to_string(),
                    description: None,
                    skills: parse_skills("rust,tokio"),
                },
            })
            .await
            .unwrap()
    }

    async fn login(&mut self, email: &str, password: &str) {
        let body = format!("email={}&password={}", email.replace('@', "%40"), password);
        let response = self.post_form("/iniciar-sesion", &body).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/administracion");
    }

    async fn candidates(&self, url: &str) -> Vec<String> {
        self.vacancies
            .find_by_url(url)
            .await
            .unwrap()
            .unwrap()
            .candidates
            .into_iter()
            .map(|c| c.name)
            .collect()
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, Vec<u8>)>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((field, content_type, bytes)) = file {
        let extension = content_type.rsplit('/').next().unwrap_or("bin");
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"upload.{extension}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn location(response: &Response<Body>) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

async fn json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn messages(view: &Value) -> Vec<String> {
    view["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap().to_string())
        .collect()
}

fn contact_fields() -> [(&'static str, &'static str); 2] {
    [("name", "Ana"), ("email", "ana@example.com")]
}

#[tokio::test]
async fn protected_routes_redirect_anonymous_visitors() {
    let mut app = TestApp::new();

    for uri in ["/vacantes/nueva", "/administracion", "/editar-perfil", "/cerrar-sesion"] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/iniciar-sesion");
    }

    let response = app
        .delete(&format!("/vacantes/eliminar/{}", Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn register_sign_in_and_sign_out() {
    let mut app = TestApp::new();

    let response = app
        .post_form(
            "/crear-cuenta",
            "name=Ana&email=ana%40example.com&password=secret123&confirm=secret123",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/iniciar-sesion");

    app.login("ana@example.com", "secret123").await;
    let signed_in_cookie = app.cookie.clone().unwrap();

    let response = app.get("/administracion").await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json(response).await;
    assert_eq!(view["page"], "Admin panel");
    assert_eq!(view["user"]["name"], "Ana");

    let response = app.get("/cerrar-sesion").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/iniciar-sesion");

    let view = json(app.get("/iniciar-sesion").await).await;
    assert_eq!(messages(&view), vec!["You signed out"]);

    let response = app.get("/administracion").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // The pre-logout cookie no longer resolves to anyone.
    app.cookie = Some(signed_in_cookie);
    let response = app.get("/administracion").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let mut app = TestApp::new();
    app.seed_user("Ana", "ana@example.com", "secret123").await;

    let response = app
        .post_form(
            "/crear-cuenta",
            "name=Other&email=ANA%40example.com&password=secret123&confirm=secret123",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let view = json(response).await;
    assert_eq!(messages(&view), vec!["That email is already registered"]);
}

#[tokio::test]
async fn wrong_password_flashes_generic_error() {
    let mut app = TestApp::new();
    app.seed_user("Ana", "ana@example.com", "secret123").await;

    let response = app
        .post_form("/iniciar-sesion", "email=ana%40example.com&password=wrong-one")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/iniciar-sesion");

    let view = json(app.get("/iniciar-sesion").await).await;
    assert_eq!(messages(&view), vec!["Invalid email or password"]);

    let response = app.post_form("/iniciar-sesion", "email=&password=").await;
    assert_eq!(location(&response), "/iniciar-sesion");
    let view = json(app.get("/iniciar-sesion").await).await;
    assert_eq!(messages(&view), vec!["Both fields are required"]);
}

#[tokio::test]
async fn created_vacancy_keeps_skill_order_and_author() {
    let mut app = TestApp::new();
    app.seed_user("Ana", "ana@example.com", "secret123").await;
    app.login("ana@example.com", "secret123").await;

    let response = app
        .post_form(
            "/vacantes/nueva",
            "title=Rust+Developer&company=Ferris+Inc&location=Remote&contract_type=Full+time&skills=go%2Crust%2Cts",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let path = location(&response);
    assert!(path.starts_with("/vacantes/rust-developer-"), "{path}");

    let view = json(app.get(&path).await).await;
    assert_eq!(view["page"], "Rust Developer");
    assert_eq!(view["vacancy"]["skills"], serde_json::json!(["go", "rust", "ts"]));
    assert_eq!(view["author"]["name"], "Ana");
    assert!(view["vacancy"].get("candidates").is_none());
}

#[tokio::test]
async fn incomplete_vacancy_form_is_shown_again() {
    let mut app = TestApp::new();
    app.seed_user("Ana", "ana@example.com", "secret123").await;
    app.login("ana@example.com", "secret123").await;

    let response = app
        .post_form("/vacantes/nueva", "title=Rust+Developer&skills=")
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let view = json(response).await;
    assert_eq!(
        messages(&view),
        vec![
            "Add a company",
            "Add a location",
            "Select the contract type",
            "Add at least one skill",
        ]
    );
    assert_eq!(view["form"]["title"], "Rust Developer");
    assert!(app.vacancies.list_recent().await.unwrap().is_empty());
}

#[tokio::test]
async fn only_the_author_can_delete() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    app.seed_user("Ana", "ana@example.com", "secret123").await;
    let vacancy = app.seed_vacancy(bob.id, "Rust Dev").await;
    let uri = format!("/vacantes/eliminar/{}", vacancy.id);

    app.login("ana@example.com", "secret123").await;
    let response = app.delete(&uri).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let unchanged = app.vacancies.find_by_id(vacancy.id).await.unwrap().unwrap();
    assert_eq!(unchanged.title, vacancy.title);

    app.login("bob@example.com", "secret123").await;
    let response = app.delete(&uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.vacancies.find_by_id(vacancy.id).await.unwrap().is_none());

    let response = app.delete(&uri).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_author_can_edit_or_see_candidates() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    app.seed_user("Ana", "ana@example.com", "secret123").await;
    let vacancy = app.seed_vacancy(bob.id, "Rust Dev").await;

    app.login("ana@example.com", "secret123").await;
    let edit = format!("/vacantes/editar/{}", vacancy.url);
    assert_eq!(app.get(&edit).await.status(), StatusCode::FORBIDDEN);
    let response = app
        .post_form(
            &edit,
            "title=Hijacked&company=X&location=Y&contract_type=Z&skills=php",
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let candidates = format!("/candidatos/{}", vacancy.id);
    assert_eq!(app.get(&candidates).await.status(), StatusCode::NOT_FOUND);

    app.login("bob@example.com", "secret123").await;
    let response = app
        .post_form(
            &edit,
            "title=Senior+Rust+Dev&company=Ferris+Inc&location=Remote&contract_type=Full+time&skills=rust%2C+axum",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/vacantes/{}", vacancy.url));

    let updated = app.vacancies.find_by_id(vacancy.id).await.unwrap().unwrap();
    assert_eq!(updated.title, "Senior Rust Dev");
    assert_eq!(updated.skills, vec!["rust", "axum"]);
    assert_eq!(app.get(&candidates).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_resume_is_rejected_with_size_message() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    let vacancy = app.seed_vacancy(bob.id, "Rust Dev").await;
    let uri = format!("/vacantes/{}", vacancy.url);

    let response = app
        .post_multipart(
            &uri,
            &contact_fields(),
            Some(("cv", "application/pdf", vec![b'x'; 500_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), uri);

    let view = json(app.get(&uri).await).await;
    assert_eq!(messages(&view), vec!["The file is too large: maximum 400kb"]);
    assert!(app.candidates(&vacancy.url).await.is_empty());
}

#[tokio::test]
async fn resume_beyond_request_limit_gets_the_size_message() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    let vacancy = app.seed_vacancy(bob.id, "Rust Dev").await;
    let uri = format!("/vacantes/{}", vacancy.url);

    let response = app
        .post_multipart(
            &uri,
            &contact_fields(),
            Some(("cv", "application/pdf", vec![b'x'; 3_000_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), uri);

    let view = json(app.get(&uri).await).await;
    assert_eq!(messages(&view), vec!["The file is too large: maximum 400kb"]);
    assert!(app.candidates(&vacancy.url).await.is_empty());
}

#[tokio::test]
async fn non_pdf_resume_is_rejected_with_format_message() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    let vacancy = app.seed_vacancy(bob.id, "Rust Dev").await;
    let uri = format!("/vacantes/{}", vacancy.url);

    let response = app
        .post_multipart(
            &uri,
            &contact_fields(),
            Some(("cv", "image/png", vec![b'x'; 300_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let view = json(app.get(&uri).await).await;
    assert_eq!(messages(&view), vec!["Invalid file format"]);
    assert!(app.candidates(&vacancy.url).await.is_empty());
}

#[tokio::test]
async fn accepted_resumes_are_appended_in_order() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    let vacancy = app.seed_vacancy(bob.id, "Rust Dev").await;
    let uri = format!("/vacantes/{}", vacancy.url);

    let response = app
        .post_multipart(
            &uri,
            &contact_fields(),
            Some(("cv", "application/pdf", vec![b'x'; 300_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert_eq!(app.candidates(&vacancy.url).await, vec!["Ana"]);

    let view = json(app.get("/").await).await;
    assert_eq!(messages(&view), vec!["Your résumé was sent"]);

    app.post_multipart(
        &uri,
        &[("name", "Carla"), ("email", "carla@example.com")],
        Some(("cv", "application/pdf", vec![b'y'; 1_000])),
    )
    .await;
    assert_eq!(app.candidates(&vacancy.url).await, vec!["Ana", "Carla"]);

    let stored = app
        .vacancies
        .find_by_url(&vacancy.url)
        .await
        .unwrap()
        .unwrap();
    for candidate in &stored.candidates {
        assert!(candidate.resume.ends_with(".pdf"));
        assert!(app.uploads.path().join("cv").join(&candidate.resume).exists());
    }

    app.login("bob@example.com", "secret123").await;
    let view = json(app.get(&format!("/candidatos/{}", vacancy.id)).await).await;
    let names: Vec<&str> = view["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ana", "Carla"]);
}

#[tokio::test]
async fn password_reset_round_trip() {
    let mut app = TestApp::new();
    app.seed_user("Ana", "ana@example.com", "secret123").await;

    let response = app
        .post_form("/reestablecer-password", "email=ana%40example.com")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/iniciar-sesion");

    let token = app
        .users
        .find_by_email("ana@example.com")
        .await
        .unwrap()
        .unwrap()
        .reset
        .unwrap()
        .token;
    let uri = format!("/reestablecer-password/{token}");

    let response = app.get(&uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["token"], token.as_str());

    let response = app.post_form(&uri, "password=brand-new-pass").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/iniciar-sesion");

    app.login("ana@example.com", "brand-new-pass").await;

    // The token is spent.
    let response = app.get(&uri).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/reestablecer-password");
}

#[tokio::test]
async fn reset_for_unknown_email_reports_missing_account() {
    let mut app = TestApp::new();

    let response = app
        .post_form("/reestablecer-password", "email=nobody%40example.com")
        .await;
    assert_eq!(location(&response), "/iniciar-sesion");

    let view = json(app.get("/iniciar-sesion").await).await;
    assert_eq!(messages(&view), vec!["No account exists for that email"]);
}

#[tokio::test]
async fn search_matches_vacancy_content() {
    let mut app = TestApp::new();
    let bob = app.seed_user("Bob", "bob@example.com", "secret123").await;
    app.seed_vacancy(bob.id, "Rust Dev").await;
    app.seed_vacancy(bob.id, "PHP Dev").await;

    let view = json(app.post_form("/buscador", "q=php").await).await;
    let hits = view["vacancies"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["title"], "PHP Dev");

    let view = json(app.post_form("/buscador", "q=dev").await).await;
    assert_eq!(view["vacancies"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_pages_are_not_found() {
    let mut app = TestApp::new();

    let response = app.get("/no-such-page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["status"], 404);

    let response = app.get("/vacantes/missing-vacancy").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/vacantes/Not_A_Slug").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_multipart(
            "/vacantes/-bad-",
            &contact_fields(),
            Some(("cv", "application/pdf", vec![b'x'; 1_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_edit_stores_avatar_and_rejects_other_formats() {
    let mut app = TestApp::new();
    let ana = app.seed_user("Ana", "ana@example.com", "secret123").await;
    app.login("ana@example.com", "secret123").await;

    let response = app
        .post_multipart(
            "/editar-perfil",
            &[("name", "Ana Maria"), ("email", "ana@example.com"), ("password", "")],
            Some(("image", "image/gif", vec![b'g'; 10_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/editar-perfil");
    let view = json(app.get("/editar-perfil").await).await;
    assert_eq!(messages(&view), vec!["Invalid file format"]);

    let response = app
        .post_multipart(
            "/editar-perfil",
            &[("name", "Ana Maria"), ("email", "ana@example.com"), ("password", "")],
            Some(("image", "image/png", vec![b'p'; 50_000])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/administracion");

    let user = app.users.find_by_id(ana.id).await.unwrap().unwrap();
    assert_eq!(user.name, "Ana Maria");
    assert_eq!(user.password_hash, ana.password_hash);
    let image = user.profile_image.unwrap();
    assert!(image.ends_with(".png"));
    assert!(app.uploads.path().join("profiles").join(&image).exists());
}
