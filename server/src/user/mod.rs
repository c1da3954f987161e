use crate::entities::*;
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use sea_orm::*;

pub mod api;
pub mod web;

/// Minimum accepted password length, the same weak-password threshold the
/// mobile client surfaced to users.
pub const MIN_PASSWORD_LEN: usize = 6;

const RESET_TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct User {
    id: i32,
    email: String,
    display_name: Option<String>,
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: i32,
        email: String,
        display_name: Option<String>,
        photo_url: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            display_name,
            photo_url,
            created_at,
        }
    }

    /// Returns the ID of the user.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the email address of the user.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name of the user, if one is set.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the avatar URL of the user, if one is set.
    pub fn photo_url(&self) -> Option<&str> {
        self.photo_url.as_deref()
    }

    /// Returns when the account was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the name to show for this user: the display name when set,
    /// otherwise the part of the email before the '@'.
    pub fn display_label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        User::new(
            model.id,
            model.email,
            model.display_name,
            model.photo_url,
            model.created_at,
        )
    }
}

/// A pending password reset issued for a user.
///
/// The token is delivered to the user out-of-band; it is consumed by
/// [`UserService::reset_password`].
#[derive(Debug, Clone)]
pub struct PasswordReset {
    token: String,
    expires_at: DateTime<Utc>,
}

impl PasswordReset {
    /// Returns the single-use reset token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns when the token stops being accepted.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Represents a duplicate account error (the email is already registered).
    #[error("An account with email '{0}' already exists")]
    EmailTaken(String),
    /// Represents a user not found error.
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    /// Represents an unknown email during a password reset request.
    #[error("No account found for '{0}'")]
    UnknownEmail(String),
    /// Represents a failed credential check. Unknown emails and wrong
    /// passwords both map here so the two cases are indistinguishable.
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// Represents a malformed email address.
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    /// Represents a password below the minimum length.
    #[error("Password must be at least 6 characters long")]
    WeakPassword,
    /// Represents a missing, already used, or expired reset token.
    #[error("Password reset link is invalid or has expired")]
    InvalidResetToken,
    /// Represents a password hashing failure.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct UserService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> UserService {
        UserService { db }
    }

    /// Creates a new user account.
    ///
    /// The email is trimmed and lowercased before it is stored. The password
    /// is hashed with argon2id; the plaintext is never persisted.
    ///
    /// # Arguments
    ///
    /// * `email` - The email address to register.
    /// * `password` - The plaintext password chosen by the user.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `User` if successful, or an error otherwise.
    #[tracing::instrument(skip(self, password))]
    pub async fn create_user(&self, email: &str, password: &str) -> Result<User, UserServiceError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(UserServiceError::InvalidEmail(email));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserServiceError::WeakPassword);
        }
        if self.email_exists(&email).await? {
            return Err(UserServiceError::EmailTaken(email));
        }

        let password_hash = hash_password(password)?;
        let active_model = user::ActiveModel {
            email: ActiveValue::Set(email),
            password_hash: ActiveValue::Set(password_hash),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(User::from(created_model))
    }

    /// Checks an email and password against the stored credentials.
    ///
    /// # Returns
    ///
    /// A `Result` containing the matching `User` if the credentials are
    /// valid, or `InvalidCredentials` otherwise.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, UserServiceError> {
        let model = self
            .find_by_email(email)
            .await?
            .ok_or(UserServiceError::InvalidCredentials)?;

        if !verify_password(password, &model.password_hash)? {
            return Err(UserServiceError::InvalidCredentials);
        }
        Ok(User::from(model))
    }

    /// Retrieves a user by their ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i32) -> Result<User, UserServiceError> {
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;
        Ok(User::from(model))
    }

    /// Retrieves a user by their email address.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_email(&self, email: &str) -> Result<User, UserServiceError> {
        let model = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| UserServiceError::UnknownEmail(normalize_email(email)))?;
        Ok(User::from(model))
    }

    /// Updates the profile fields of a user.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the user to update.
    /// * `display_name` - When `Some`, replaces the display name. A blank
    ///   value clears it so the email prefix takes over again.
    /// * `photo_url` - When `Some`, replaces the avatar URL.
    ///
    /// # Returns
    ///
    /// A `Result` containing the updated `User` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn update_profile(
        &self,
        id: i32,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Result<User, UserServiceError> {
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;

        let mut active_model: user::ActiveModel = model.into();
        if let Some(name) = display_name {
            let trimmed = name.trim().to_string();
            active_model.display_name = ActiveValue::Set((!trimmed.is_empty()).then_some(trimmed));
        }
        if let Some(url) = photo_url {
            active_model.photo_url = ActiveValue::Set(Some(url));
        }
        let updated_model = active_model.update(self.db).await?;
        Ok(User::from(updated_model))
    }

    /// Issues a password reset token for the given email.
    ///
    /// The token is a UUID valid for 30 minutes; issuing a new one replaces
    /// any previous token. The caller is responsible for delivering it.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PasswordReset` if successful, or
    /// `UnknownEmail` when no account matches.
    #[tracing::instrument(skip(self))]
    pub async fn create_password_reset(
        &self,
        email: &str,
    ) -> Result<PasswordReset, UserServiceError> {
        let model = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| UserServiceError::UnknownEmail(normalize_email(email)))?;

        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = Utc::now() + chrono::Duration::minutes(RESET_TOKEN_TTL_MINUTES);

        let mut active_model: user::ActiveModel = model.into();
        active_model.reset_token = ActiveValue::Set(Some(token.clone()));
        active_model.reset_token_expires = ActiveValue::Set(Some(expires_at));
        active_model.update(self.db).await?;

        Ok(PasswordReset { token, expires_at })
    }

    /// Consumes a reset token and stores a new password.
    ///
    /// The token is cleared on success so it cannot be replayed.
    #[tracing::instrument(skip(self, token, new_password))]
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<User, UserServiceError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserServiceError::WeakPassword);
        }

        let model = user::Entity::find()
            .filter(user::Column::ResetToken.eq(token))
            .one(self.db)
            .await?
            .ok_or(UserServiceError::InvalidResetToken)?;

        match model.reset_token_expires {
            Some(expires) if expires > Utc::now() => {}
            _ => return Err(UserServiceError::InvalidResetToken),
        }

        let password_hash = hash_password(new_password)?;
        let mut active_model: user::ActiveModel = model.into();
        active_model.password_hash = ActiveValue::Set(password_hash);
        active_model.reset_token = ActiveValue::Set(None);
        active_model.reset_token_expires = ActiveValue::Set(None);
        let updated_model = active_model.update(self.db).await?;
        Ok(User::from(updated_model))
    }

    /// Deletes a user account after re-checking their password.
    ///
    /// Deleting the row cascades to the user's tasks.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the account to delete.
    /// * `password` - The current password, required as re-authentication.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `User` if successful, or an error otherwise.
    #[tracing::instrument(skip(self, password))]
    pub async fn delete_account(&self, id: i32, password: &str) -> Result<User, UserServiceError> {
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;

        if !verify_password(password, &model.password_hash)? {
            return Err(UserServiceError::InvalidCredentials);
        }

        let user_copy = User::from(model.clone());
        user::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(user_copy)
    }

    /// Checks if an account with the given (already normalized) email exists.
    #[tracing::instrument(skip(self))]
    async fn email_exists(&self, email: &str) -> Result<bool, UserServiceError> {
        let existing_user = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db)
            .await?;
        Ok(existing_user.is_some())
    }

    /// Looks up the stored account for an email, normalizing it first.
    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, UserServiceError> {
        let email = normalize_email(email);
        let model = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(self.db)
            .await?;
        Ok(model)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String, UserServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| UserServiceError::PasswordHash(err.to_string()))
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool, UserServiceError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| UserServiceError::PasswordHash(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
