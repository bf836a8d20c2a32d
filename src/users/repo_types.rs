use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::media::StoredAsset;

/// Admin user record. Security fields never leave the server: the password
/// hash and the pending reset-token pair are excluded from serialization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub about_me: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar_id: String,
    pub avatar_url: String,
    pub resume_id: String,
    pub resume_url: String,
    pub portfolio_url: String,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Fields required to insert a user at registration time.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub about_me: String,
    pub password_hash: String,
    pub avatar: StoredAsset,
    pub resume: StoredAsset,
    pub portfolio_url: String,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
}

/// Sparse set of proposed profile changes. `None` means "leave as is".
#[derive(Debug, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub about_me: Option<String>,
    pub portfolio_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub avatar: Option<StoredAsset>,
    pub resume: Option<StoredAsset>,
}

impl User {
    /// Applies a patch to an existing record and returns the new value.
    /// Pure; persisting the result is the caller's job.
    pub fn merged(&self, patch: UserPatch) -> User {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(email) = patch.email {
            next.email = email;
        }
        if let Some(phone) = patch.phone {
            next.phone = phone;
        }
        if let Some(about_me) = patch.about_me {
            next.about_me = about_me;
        }
        if let Some(portfolio_url) = patch.portfolio_url {
            next.portfolio_url = portfolio_url;
        }
        if let Some(github_url) = patch.github_url {
            next.github_url = Some(github_url);
        }
        if let Some(linkedin_url) = patch.linkedin_url {
            next.linkedin_url = Some(linkedin_url);
        }
        if let Some(instagram_url) = patch.instagram_url {
            next.instagram_url = Some(instagram_url);
        }
        if let Some(twitter_url) = patch.twitter_url {
            next.twitter_url = Some(twitter_url);
        }
        if let Some(avatar) = patch.avatar {
            next.avatar_id = avatar.id;
            next.avatar_url = avatar.url;
        }
        if let Some(resume) = patch.resume {
            next.resume_id = resume.id;
            next.resume_url = resume.url;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: "+1-555-0100".into(),
            about_me: "Engineer".into(),
            password_hash: "$argon2id$fake".into(),
            avatar_id: "avatar/a.png".into(),
            avatar_url: "https://media.local/avatar/a.png".into(),
            resume_id: "resume/r.pdf".into(),
            resume_url: "https://media.local/resume/r.pdf".into(),
            portfolio_url: "https://ada.dev".into(),
            github_url: Some("https://github.com/ada".into()),
            linkedin_url: None,
            instagram_url: None,
            twitter_url: None,
            reset_token_hash: Some("digest".into()),
            reset_token_expires_at: Some(OffsetDateTime::now_utc()),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn merged_keeps_unset_fields() {
        let user = sample_user();
        let next = user.merged(UserPatch::default());
        assert_eq!(next.name, user.name);
        assert_eq!(next.email, user.email);
        assert_eq!(next.avatar_id, user.avatar_id);
        assert_eq!(next.github_url, user.github_url);
    }

    #[test]
    fn merged_replaces_set_fields() {
        let user = sample_user();
        let next = user.merged(UserPatch {
            name: Some("Grace".into()),
            twitter_url: Some("https://twitter.com/grace".into()),
            avatar: Some(StoredAsset {
                id: "avatar/new.png".into(),
                url: "https://media.local/avatar/new.png".into(),
            }),
            ..Default::default()
        });
        assert_eq!(next.name, "Grace");
        assert_eq!(next.twitter_url.as_deref(), Some("https://twitter.com/grace"));
        assert_eq!(next.avatar_id, "avatar/new.png");
        assert_eq!(next.avatar_url, "https://media.local/avatar/new.png");
        // untouched
        assert_eq!(next.resume_id, user.resume_id);
        assert_eq!(next.phone, user.phone);
    }

    #[test]
    fn serialization_excludes_security_fields() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("reset_token_hash").is_none());
        assert!(json.get("reset_token_expires_at").is_none());
        assert!(json.get("email").is_some());
        assert!(json.get("avatar_url").is_some());
    }
}
