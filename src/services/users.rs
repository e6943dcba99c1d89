use crate::{
    entities::{profile, user},
    errors::ServiceError,
    events::{Event, EventSender},
    models::normalize_email,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterUserInput {
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 100))]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub last_name: String,
}

/// Replacement contact and shipping details for a profile.
///
/// The profile email mirrors the account email and is not editable here.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(max = 100))]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub last_name: String,
    #[validate(length(min = 1, max = 50))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub address: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 75))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 75))]
    pub country: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredUser {
    pub user: user::Model,
    pub profile: profile::Model,
}

/// Users and their profiles.
///
/// A user never exists without a profile: `register` creates both in the
/// same transaction.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, input: RegisterUserInput) -> Result<RegisteredUser, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let user = create_user(&txn, &input)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, "username or email already registered"))?;
        let profile = create_profile_for(&txn, &user).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::UserRegistered {
                user_id: user.id,
                username: user.username.clone(),
            })
            .await;

        info!(user_id = user.id, "Registered user");
        Ok(RegisteredUser { user, profile })
    }

    /// Username of the account registered with `email`, if any.
    pub async fn email_registered(&self, email: &str) -> Result<Option<String>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?
            .map(|u| u.username))
    }

    pub async fn profile_of(&self, user_id: i32) -> Result<profile::Model, ServiceError> {
        profile::Entity::find()
            .filter(profile::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Profile for user {} not found", user_id)))
    }

    /// Replaces the editable fields of a user's profile.
    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: i32,
        input: UpdateProfileInput,
    ) -> Result<profile::Model, ServiceError> {
        input.validate()?;

        let mut profile: profile::ActiveModel = self.profile_of(user_id).await?.into();
        profile.first_name = Set(input.first_name.trim().to_string());
        profile.last_name = Set(input.last_name.trim().to_string());
        profile.phone = Set(trimmed(input.phone));
        profile.address = Set(trimmed(input.address));
        profile.city = Set(trimmed(input.city));
        profile.state = Set(trimmed(input.state));
        profile.country = Set(trimmed(input.country));
        profile.zip_code = Set(trimmed(input.zip_code));

        let updated = profile.update(&*self.db).await?;
        info!(user_id, "Updated profile");
        Ok(updated)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_user<C: ConnectionTrait>(
    conn: &C,
    input: &RegisterUserInput,
) -> Result<user::Model, DbErr> {
    user::ActiveModel {
        username: Set(input.username.trim().to_string()),
        email: Set(normalize_email(&input.email)),
        first_name: Set(input.first_name.trim().to_string()),
        last_name: Set(input.last_name.trim().to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

/// Creates the profile of a freshly created user, copying contact details.
pub async fn create_profile_for<C: ConnectionTrait>(
    conn: &C,
    user: &user::Model,
) -> Result<profile::Model, DbErr> {
    profile::ActiveModel {
        user_id: Set(user.id),
        email: Set(user.email.clone()),
        first_name: Set(user.first_name.clone()),
        last_name: Set(user.last_name.clone()),
        phone: Set(None),
        address: Set(None),
        city: Set(None),
        state: Set(None),
        country: Set(None),
        zip_code: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
}
