use std::collections::HashMap;

use anyhow::Context;
use axum::{
    extract::{FromRef, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::CookieJar;
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse,
            ResetPasswordRequest, UpdatePasswordRequest, UserResponse,
        },
        extractors::CurrentUser,
        jwt::{expired_session_cookie, session_cookie, SessionKeys},
        password::{hash_password, verify_password},
        reset::{digest_secret, generate_reset_secret, reset_expiry},
    },
    error::ApiError,
    mailer::reset_email_html,
    media::StoredAsset,
    state::AppState,
    users::{NewUser, User, UserPatch},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

const MIN_PASSWORD_LEN: usize = 8;

struct FileUpload {
    body: Bytes,
    content_type: String,
}

/// Collected multipart form: text fields and file parts by name.
#[derive(Default)]
struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, FileUpload>,
}

impl FormData {
    fn required(&self, key: &str) -> Result<String, ApiError> {
        self.field(key)
            .ok_or_else(|| ApiError::BadRequest(format!("{key} is required")))
    }

    fn field(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData::default();
    while let Some(field) = multipart.next_field().await? {
        let name = match field.name() {
            Some(n) => n.to_string(),
            None => continue,
        };
        if field.file_name().is_some() {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = field.bytes().await?;
            form.files.insert(name, FileUpload { body, content_type });
        } else {
            form.fields.insert(name, field.text().await?);
        }
    }
    Ok(form)
}

/// Signs a session token for the user, sets the cookie and builds the
/// `{success, message, user, token}` envelope.
fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
    message: &str,
    status: StatusCode,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let keys = SessionKeys::from_ref(state);
    let (token, _expires_at) = keys.sign(user.id)?;
    let jar = jar.add(session_cookie(
        token.clone(),
        keys.ttl,
        state.config.cookie_secure,
    ));
    info!(user_id = %user.id, "session token issued");
    Ok((
        status,
        jar,
        Json(AuthResponse {
            success: true,
            message: message.to_string(),
            user,
            token,
        }),
    ))
}

/// Uploads a replacement asset, then deletes the old copy. The old asset is
/// only removed after the new upload succeeded, and only when the key
/// actually changed. A failed delete orphans one object; that is logged,
/// not fatal.
async fn replace_asset(
    state: &AppState,
    upload: FileUpload,
    folder: &str,
    old_id: &str,
) -> Result<StoredAsset, ApiError> {
    let asset = state
        .media
        .upload(upload.body, &upload.content_type, folder)
        .await
        .with_context(|| format!("upload {folder}"))?;
    if asset.id != old_id {
        if let Err(e) = state.media.delete(old_id).await {
            warn!(error = %e, asset_id = %old_id, "failed to delete replaced asset");
        }
    }
    Ok(asset)
}

#[instrument(skip(state, jar, multipart))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let mut form = read_form(multipart).await?;

    let name = form.required("name")?;
    let email = form.required("email")?.to_lowercase();
    let phone = form.required("phone")?;
    let about_me = form.required("aboutme")?;
    let password = form.required("password")?;
    let portfolio_url = form.required("portfolioURL")?;

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Password must contain at least 8 characters".into(),
        ));
    }
    let mut files = std::mem::take(&mut form.files);
    let (avatar_file, resume_file) = match (files.remove("avatar"), files.remove("resume")) {
        (Some(a), Some(r)) => (a, r),
        _ => return Err(ApiError::BadRequest("Avatar and resume are required".into())),
    };

    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("User already exists".into()));
    }

    // Both uploads must land before the user row exists: a failure here
    // aborts registration with no partial user.
    let avatar = state
        .media
        .upload(avatar_file.body, &avatar_file.content_type, "avatar")
        .await
        .context("upload avatar")?;
    let resume = state
        .media
        .upload(resume_file.body, &resume_file.content_type, "resume")
        .await
        .context("upload resume")?;

    let password_hash = hash_password(&password)?;

    let user = User::create(
        &state.db,
        &NewUser {
            name,
            email,
            phone,
            about_me,
            password_hash,
            avatar,
            resume,
            portfolio_url,
            github_url: form.field("gitHubURL"),
            linkedin_url: form.field("linkedInURL"),
            instagram_url: form.field("instagramURL"),
            twitter_url: form.field("twitterURL"),
        },
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue_session(&state, jar, user, "User Registered", StatusCode::CREATED)
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::NotFound("User not found".into())
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Invalid Email or Password".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_session(&state, jar, user, "User logged in", StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    info!(user_id = %user.id, "user logged out");
    let jar = jar.add(expired_session_cookie(state.config.cookie_secure));
    (
        jar,
        Json(MessageResponse {
            success: true,
            message: "User logged out".into(),
        }),
    )
}

#[instrument(skip_all)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse {
        success: true,
        user,
    })
}

#[instrument(skip(state))]
pub async fn public_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let mut form = read_form(multipart).await?;

    if let Some(email) = form.field("email") {
        if !is_valid_email(&email) {
            return Err(ApiError::BadRequest("Invalid email".into()));
        }
    }

    let mut patch = UserPatch {
        name: form.field("name"),
        email: form.field("email").map(|e| e.to_lowercase()),
        phone: form.field("phone"),
        about_me: form.field("aboutme"),
        portfolio_url: form.field("portfolioURL"),
        github_url: form.field("gitHubURL"),
        linkedin_url: form.field("linkedInURL"),
        instagram_url: form.field("instagramURL"),
        twitter_url: form.field("twitterURL"),
        ..Default::default()
    };

    if let Some(upload) = form.files.remove("avatar") {
        patch.avatar = Some(replace_asset(&state, upload, "avatar", &user.avatar_id).await?);
    }
    if let Some(upload) = form.files.remove("resume") {
        patch.resume = Some(replace_asset(&state, upload, "resume", &user.resume_id).await?);
    }

    let merged = user.merged(patch);
    let updated = User::update_profile(&state.db, &merged).await?;

    info!(user_id = %updated.id, "profile updated");
    issue_session(
        &state,
        jar,
        updated,
        "User updated Successfully",
        StatusCode::OK,
    )
}

#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.current_password.is_empty()
        || payload.new_password.is_empty()
        || payload.confirm_password.is_empty()
    {
        return Err(ApiError::BadRequest("All fields are required".into()));
    }

    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "incorrect current password");
        return Err(ApiError::Unauthorized("Incorrect current password".into()));
    }
    if payload.new_password != payload.confirm_password {
        return Err(ApiError::BadRequest(
            "New password and confirm password do not match".into(),
        ));
    }
    if payload.new_password == payload.current_password {
        return Err(ApiError::BadRequest(
            "New password cannot be the same as current password".into(),
        ));
    }
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Password must contain at least 8 characters".into(),
        ));
    }

    let password_hash = hash_password(&payload.new_password)?;
    User::set_password(&state.db, user.id, &password_hash).await?;

    // The existing session token stays valid; no new token is issued here.
    info!(user_id = %user.id, "password updated");
    Ok(Json(MessageResponse {
        success: true,
        message: "Password updated successfully".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let (secret, digest) = generate_reset_secret();
    let expires_at = reset_expiry(OffsetDateTime::now_utc());
    User::set_reset_token(&state.db, user.id, &digest, expires_at).await?;

    let reset_url = format!(
        "{}/password/reset/{}",
        state.config.dashboard_url.trim_end_matches('/'),
        secret
    );
    let html = reset_email_html(&user.name, &reset_url);

    if let Err(e) = state
        .mailer
        .send(&user.email, "Password Reset Request", &html)
        .await
    {
        // Roll back so an undelivered token does not block a retry.
        if let Err(clear_err) = User::clear_reset_token(&state.db, user.id).await {
            warn!(error = %clear_err, user_id = %user.id, "failed to clear reset token after mail failure");
        }
        return Err(ApiError::Internal(e.context("send reset mail")));
    }

    info!(user_id = %user.id, "reset link sent");
    Ok(Json(MessageResponse {
        success: true,
        message: "Reset link sent to the registered email".into(),
    }))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let digest = digest_secret(&token);
    // Deliberately vague: does not reveal whether the token was unknown or
    // just expired.
    let user = User::find_by_reset_digest(&state.db, &digest, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| {
            ApiError::BadRequest("Reset password token is invalid or has been expired.".into())
        })?;

    // Validation failures past this point leave the token in place so a
    // legitimate retry with the same link still works.
    if payload.password.is_empty() || payload.confirm_password.is_empty() {
        return Err(ApiError::BadRequest("All fields are required".into()));
    }
    if payload.password != payload.confirm_password {
        return Err(ApiError::BadRequest(
            "Password & Confirm Password do not match".into(),
        ));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Password must contain at least 8 characters".into(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;
    User::set_password_and_clear_reset(&state.db, user.id, &password_hash).await?;

    info!(user_id = %user.id, "password reset");
    issue_session(
        &state,
        jar,
        user,
        "Reset Password Successfully!",
        StatusCode::OK,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.io"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn form_field_trims_and_drops_empty() {
        let mut form = FormData::default();
        form.fields.insert("name".into(), "  Ada  ".into());
        form.fields.insert("phone".into(), "   ".into());
        assert_eq!(form.field("name").as_deref(), Some("Ada"));
        assert_eq!(form.field("phone"), None);
        assert!(form.required("phone").is_err());
        assert!(form.required("missing").is_err());
    }

    #[tokio::test]
    async fn issue_session_sets_cookie_and_envelope() {
        use crate::auth::jwt::SESSION_COOKIE;

        let state = AppState::fake();
        let user = sample_user();
        let user_id = user.id;
        let (status, jar, Json(body)) =
            issue_session(&state, CookieJar::new(), user, "User logged in", StatusCode::OK)
                .expect("issue session");
        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert_eq!(body.message, "User logged in");
        assert_eq!(body.user.id, user_id);

        let cookie = jar.get(SESSION_COOKIE).expect("cookie set");
        assert_eq!(cookie.value(), body.token);

        let keys = SessionKeys::from_ref(&state);
        let claims = keys.verify(&body.token).expect("token verifies");
        assert_eq!(claims.sub, user_id);
    }

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "a@x.com".into(),
            phone: "+1-555-0100".into(),
            about_me: "Engineer".into(),
            password_hash: "$argon2id$fake".into(),
            avatar_id: "avatar/a.png".into(),
            avatar_url: "https://fake.local/avatar/a.png".into(),
            resume_id: "resume/r.pdf".into(),
            resume_url: "https://fake.local/resume/r.pdf".into(),
            portfolio_url: "https://ada.dev".into(),
            github_url: None,
            linkedin_url: None,
            instagram_url: None,
            twitter_url: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
