#[macro_use] extern crate rocket;

mod config;
mod drive;
mod folders;
mod gallery;
mod logging;
mod member;
mod nav_data;
mod photos;
mod storage;
mod upload;
#[cfg(test)]
mod testing;

use chrono::{Datelike, Utc};
use config::Config;
use drive::DriveClient;
use member::{Member, Members, SingleMember};
use storage::{Storage, StorageError};
use upload::{PhotoUpload, UploadOutcome, UploadRouter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use rocket::{Build, Request, Rocket, State};
use rocket::data::{Limits, ToByteUnit};
use rocket::form::{self, error::ErrorKind, Form};
use rocket::fs::{FileServer, TempFile};
use rocket::http::{CookieJar, Status};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::serde::Serialize;
use rocket::tokio::io::AsyncReadExt;
use rocket_dyn_templates::{Template, context};
use tracing::{error, info, warn};



#[launch]
async fn rocket() -> _ {
    logging::init();

    // Try to read the config file
    let config = Config::read_or_exit();

    // Load the service account credentials, or exit immediately in case of an error
    let timeout = Duration::from_secs(config.REQUEST_TIMEOUT);
    let storage: Storage = match DriveClient::from_credentials_file(&config.CREDENTIALS_PATH, timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("unable to load the service account credentials : {e}");
            std::process::exit(-1);
        }
    };

    // Pages can still be served if the backend is down, so only warn about it
    match storage.authenticate().await.map_err(Error::from) {
        Ok(()) => info!(root_folder_id = %config.ROOT_FOLDER_ID, "storage backend is reachable"),
        Err(e) => warn!("{e}, will retry on each request"),
    }

    let members: Members = Arc::new(SingleMember::from_config(&config));
    build_rocket(config, storage, members)
}


/// Build the web app around the given config, storage backend and member lookup
fn build_rocket(config: Config, storage: Storage, members: Members) -> Rocket<Build> {
    let upload_limit = config.MAX_UPLOAD_SIZE.mebibytes();
    let limits = Limits::default()
        .limit("file", upload_limit)
        .limit("data-form", upload_limit + 1u64.mebibytes());
    let mut figment = rocket::Config::figment()
        .merge(("address", config.ADDRESS.clone()))
        .merge(("port", config.PORT))
        .merge(("limits", limits));
    if !config.SECRET_KEY.is_empty() {
        figment = figment.merge(("secret_key", config.SECRET_KEY.clone()));
    }

    // Let's go to spaaace !
    rocket::custom(figment)
        .mount("/", routes![
            index,
            get_login,
            post_login,
            logout,
            get_upload,
            get_upload_login,
            post_upload,
            post_upload_login,
            get_gallery_root,
            get_gallery,
        ])
        .mount("/static", FileServer::from("static/").rank(0))
        .register("/", catchers![not_found])
        .attach(Template::fairing())
        .manage(config)
        .manage(storage)
        .manage(members)
}


/// Route handler for the home page
#[get("/")]
fn index(config: &State<Config>, member: Option<Member>, flash: Option<FlashMessage<'_>>) -> Template {
    Template::render("index", context! {
        current_year: current_year(),
        config: config.inner(),
        member: member,
        messages: Notice::from_flash(flash),
        url_gallery_root: uri!(get_gallery_root()).to_string(),
    })
}


#[derive(FromForm)]
struct LoginForm {
    username: String,
    password: String,
}

/// Route handler for the login form
#[get("/login?<next>")]
fn get_login(next: Option<&str>, config: &State<Config>, member: Option<Member>, flash: Option<FlashMessage<'_>>) -> PageResult {
    match member {
        Some(_) => PageResult::Redirect(Flash::success(Redirect::to(member::safe_next(next)), "You are already logged in.")),
        None => PageResult::Ok(render_login(config, next, Notice::from_flash(flash))),
    }
}

/// Route handler called when the login form is submitted
#[post("/login?<next>", data = "<form>")]
fn post_login(next: Option<&str>, form: Form<LoginForm>, cookies: &CookieJar<'_>, config: &State<Config>, members: &State<Members>) -> PageResult {
    match members.verify(form.username.trim(), &form.password) {
        Some(member) => {
            member::start_session(cookies, &member);
            PageResult::Redirect(Flash::success(Redirect::to(member::safe_next(next)), "Logged in successfully."))
        }
        None => {
            warn!(username = %form.username, "failed login attempt");
            let template = render_login(config, next, vec![Notice::error("Invalid username or password.")]);
            PageResult::Unauthorized(template)
        }
    }
}

fn render_login(config: &State<Config>, next: Option<&str>, messages: Vec<Notice>) -> Template {
    Template::render("login", context! {
        current_year: current_year(),
        config: config.inner(),
        messages: messages,
        url_login: uri!(get_login(next)).to_string(),
    })
}

/// Route handler for logging out
#[get("/logout")]
fn logout(cookies: &CookieJar<'_>) -> Flash<Redirect> {
    member::end_session(cookies);
    Flash::success(Redirect::to(uri!(index)), "You have been logged out.")
}


/// Route handler for the upload form
#[get("/upload")]
fn get_upload(member: Member, config: &State<Config>, flash: Option<FlashMessage<'_>>) -> Template {
    render_upload(config, member, Notice::from_flash(flash))
}

/// Called instead of `get_upload` when the client isn't logged in
#[get("/upload", rank = 2)]
fn get_upload_login() -> Redirect {
    Redirect::to(uri!(get_login(Some("/upload"))))
}

#[derive(FromForm)]
struct UploadForm<'r> {
    photo: form::Result<'r, TempFile<'r>>,
    folder_name: Option<String>,
}

/// Route handler called when the upload form is submitted
#[post("/upload", data = "<form>")]
async fn post_upload(member: Member, form: form::Result<'_, Form<UploadForm<'_>>>, config: &State<Config>, storage: &State<Storage>) -> Template {
    let form = match form {
        Ok(form) => form.into_inner(),
        Err(errors) => {
            warn!(username = %member.username, "invalid upload form : {errors}");
            return render_upload(config, member, vec![upload_form_error(&errors, config)]);
        }
    };

    // Check that a file has actually been sent
    let file = match form.photo {
        Ok(file) => file,
        Err(errors) if errors.iter().all(|e| matches!(e.kind, ErrorKind::Missing)) => {
            return render_upload(config, member, vec![Notice::error("No photo file part in the request.")]);
        }
        Err(errors) => {
            warn!(username = %member.username, "invalid photo part : {errors}");
            return render_upload(config, member, vec![upload_form_error(&errors, config)]);
        }
    };
    let raw_name = file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
        .unwrap_or("");
    if raw_name.is_empty() {
        return render_upload(config, member, vec![Notice::error("No photo selected for uploading.")]);
    }

    let file_name = upload::secure_filename(raw_name, file.content_type());
    let media_type = upload::media_type_for(&file_name, file.content_type());
    let bytes = match read_temp_file(&file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(file_name = %file_name, "unable to read the uploaded file : {e}");
            return render_upload(config, member, vec![Notice::error(&format!("An error occurred during upload: {e}"))]);
        }
    };

    // Credentials are checked before anything is sent
    if let Err(e) = storage.authenticate().await {
        error!(file_name = %file_name, "unable to authenticate with the storage backend : {e}");
        return render_upload(config, member, vec![Notice::error(gallery::CONNECTION_ERROR_MESSAGE)]);
    }

    info!(username = %member.username, file_name = %file_name, size = bytes.len(), "receiving photo upload");
    let router = UploadRouter::new(storage.inner().as_ref(), &config.ROOT_FOLDER_ID, config.FOLDERS_PAGE_SIZE);
    let report = router.route(PhotoUpload {
        bytes,
        file_name,
        media_type,
        target_folder_name: form.folder_name,
    }).await;

    let mut messages = Vec::new();
    if let Some(warning) = report.destination.warning() {
        messages.push(Notice::warning(&warning));
    }
    messages.push(match report.outcome {
        UploadOutcome::Succeeded { view_url, .. } => Notice {
            kind: "success".to_string(),
            text: format!("Photo '{}' uploaded successfully!", report.file_name),
            link: Some(view_url),
        },
        UploadOutcome::Failed { reason } => Notice::error(&format!("An error occurred during upload: {reason}")),
    });
    render_upload(config, member, messages)
}

/// Called instead of `post_upload` when the client isn't logged in
#[post("/upload", rank = 2)]
fn post_upload_login() -> Redirect {
    Redirect::to(uri!(get_login(Some("/upload"))))
}

/// Failure message for an upload form that couldn't be parsed
fn upload_form_error(errors: &form::Errors<'_>, config: &Config) -> Notice {
    if errors.status() == Status::PayloadTooLarge {
        Notice::error(&format!("Photo is too large (max {} MiB).", config.MAX_UPLOAD_SIZE))
    } else {
        Notice::error(&format!("An error occurred during upload: {errors}"))
    }
}

/// Read the whole content of an uploaded file
async fn read_temp_file(file: &TempFile<'_>) -> std::io::Result<Vec<u8>> {
    let reader = file.open().await?;
    rocket::tokio::pin!(reader);
    let mut bytes = Vec::with_capacity(file.len() as usize);
    reader.read_to_end(&mut bytes).await?;
    Ok(bytes)
}

fn render_upload(config: &State<Config>, member: Member, messages: Vec<Notice>) -> Template {
    Template::render("upload", context! {
        current_year: current_year(),
        config: config.inner(),
        member: member,
        messages: messages,
        url_upload: uri!(post_upload).to_string(),
    })
}


/// Route handler for the gallery of the root folder
#[get("/gallery")]
async fn get_gallery_root(config: &State<Config>, storage: &State<Storage>, member: Option<Member>) -> Template {
    render_gallery(config, storage, member, None).await
}

/// Route handler for the gallery of the given folder
#[get("/gallery/<folder_id>")]
async fn get_gallery(folder_id: &str, config: &State<Config>, storage: &State<Storage>, member: Option<Member>) -> Template {
    render_gallery(config, storage, member, Some(folder_id)).await
}

async fn render_gallery(config: &State<Config>, storage: &State<Storage>, member: Option<Member>, folder_id: Option<&str>) -> Template {
    let page = gallery::load_page(storage.inner().as_ref(), config.inner(), folder_id).await;
    Template::render("gallery", context! {
        current_year: current_year(),
        config: config.inner(),
        member: member,
        nav: &page.nav,
        folders: &page.folders,
        photos: &page.photos,
        messages: page.error.as_deref().map(Notice::error).into_iter().collect::<Vec<Notice>>(),
    })
}


/// Render the 404 page
#[catch(404)]
fn not_found(request: &Request<'_>) -> Template {
    Template::render("404", context! {
        current_year: current_year(),
        config: request.rocket().state::<Config>(),
        url_gallery_root: uri!(get_gallery_root()).to_string(),
    })
}


/// Year shown in the footer of every page
fn current_year() -> i32 {
    Utc::now().year()
}


/// Message shown at the top of a page
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Notice {
    /// `success`, `warning` or `error`
    pub kind: String,
    pub text: String,
    pub link: Option<String>,
}

impl Notice {
    fn error(text: &str) -> Self {
        Self { kind: "error".to_string(), text: text.to_string(), link: None }
    }

    fn warning(text: &str) -> Self {
        Self { kind: "warning".to_string(), text: text.to_string(), link: None }
    }

    fn from_flash(flash: Option<FlashMessage<'_>>) -> Vec<Self> {
        flash.into_iter()
            .map(|f| Self { kind: f.kind().to_string(), text: f.message().to_string(), link: None })
            .collect()
    }
}


/// Responder used by routes that either render a page or redirect
#[derive(Responder)]
pub enum PageResult {
    Ok(Template),
    Redirect(Flash<Redirect>),
    #[response(status = 401)]
    Unauthorized(Template),
}


/// Generic error type used to uniformize errors across the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file error for \"{path}\" : {0}", path = .1.display())]
    FileError(std::io::Error, PathBuf),
    #[error("parser error : {0}")]
    TomlParserError(#[from] toml::de::Error),
    #[error("invalid credentials file : {0}")]
    JsonParserError(#[from] serde_json::Error),
    #[error("invalid config : {0}")]
    InvalidConfig(String),
    #[error("storage error : {0}")]
    StorageError(#[from] StorageError),
}
