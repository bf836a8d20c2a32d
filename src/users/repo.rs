use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User};

const USER_COLUMNS: &str = "id, name, email, phone, about_me, password_hash, \
     avatar_id, avatar_url, resume_id, resume_url, portfolio_url, \
     github_url, linkedin_url, instagram_url, twitter_url, \
     reset_token_hash, reset_token_expires_at, created_at";

impl User {
    /// Find a user by email. Email is unique at the store level.
    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Find the user holding an unexpired reset token with this digest.
    pub async fn find_by_reset_digest(
        db: &PgPool,
        digest: &str,
        now: OffsetDateTime,
    ) -> sqlx::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE reset_token_hash = $1 AND reset_token_expires_at > $2"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(digest)
            .bind(now)
            .fetch_optional(db)
            .await
    }

    /// Insert a new user. A duplicate email violates the unique constraint
    /// and surfaces as a database error the caller maps to Conflict.
    pub async fn create(db: &PgPool, new_user: &NewUser) -> sqlx::Result<User> {
        let sql = format!(
            "INSERT INTO users \
             (name, email, phone, about_me, password_hash, \
              avatar_id, avatar_url, resume_id, resume_url, portfolio_url, \
              github_url, linkedin_url, instagram_url, twitter_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.phone)
            .bind(&new_user.about_me)
            .bind(&new_user.password_hash)
            .bind(&new_user.avatar.id)
            .bind(&new_user.avatar.url)
            .bind(&new_user.resume.id)
            .bind(&new_user.resume.url)
            .bind(&new_user.portfolio_url)
            .bind(&new_user.github_url)
            .bind(&new_user.linkedin_url)
            .bind(&new_user.instagram_url)
            .bind(&new_user.twitter_url)
            .fetch_one(db)
            .await
    }

    /// Persist a merged profile record produced by [`User::merged`].
    pub async fn update_profile(db: &PgPool, user: &User) -> sqlx::Result<User> {
        let sql = format!(
            "UPDATE users SET \
             name = $2, email = $3, phone = $4, about_me = $5, \
             avatar_id = $6, avatar_url = $7, resume_id = $8, resume_url = $9, \
             portfolio_url = $10, github_url = $11, linkedin_url = $12, \
             instagram_url = $13, twitter_url = $14 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.about_me)
            .bind(&user.avatar_id)
            .bind(&user.avatar_url)
            .bind(&user.resume_id)
            .bind(&user.resume_url)
            .bind(&user.portfolio_url)
            .bind(&user.github_url)
            .bind(&user.linkedin_url)
            .bind(&user.instagram_url)
            .bind(&user.twitter_url)
            .fetch_one(db)
            .await
    }

    pub async fn set_password(db: &PgPool, id: Uuid, password_hash: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Store the reset-token digest and its expiry. Both fields move
    /// together: a pending reset sets both, a consumed one clears both.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        digest: &str,
        expires_at: OffsetDateTime,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = $2, reset_token_expires_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = NULL, reset_token_expires_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Set the new password and clear the reset pair in one statement so a
    /// consumed token can never survive a successful reset.
    pub async fn set_password_and_clear_reset(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, \
             reset_token_hash = NULL, reset_token_expires_at = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
        Ok(())
    }
}
