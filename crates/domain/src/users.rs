//! Account registration and self-service profile management.

use chrono::NaiveDate;
use common::{Page, UserId};
use store::{Entity, MarketStore, NewUser, User, UserChanges};

use crate::{DomainError, Result};

/// Shortest password accepted at registration or on a password change.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Sign-up input.
#[derive(Debug, Clone)]
pub struct Registration {
    pub phone: String,
    pub password: String,
    pub full_name: String,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Profile patch. `None` leaves the field as is; a new password is re-hashed.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub phone: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.password.is_none()
            && self.full_name.is_none()
            && self.about.is_none()
            && self.avatar.is_none()
            && self.birth_date.is_none()
    }
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

fn phone_taken(e: DomainError) -> DomainError {
    match e {
        DomainError::Conflict(_) => DomainError::Conflict("Phone already registered".to_string()),
        other => other,
    }
}

/// Service for user accounts.
#[derive(Clone)]
pub struct UserService<S: MarketStore> {
    store: S,
}

impl<S: MarketStore> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates an account with a hashed password.
    #[tracing::instrument(skip(self, registration), fields(phone = %registration.phone))]
    pub async fn register(&self, registration: Registration) -> Result<User> {
        check_password(&registration.password)?;
        let hashed_password = auth::hash_password(&registration.password)?;

        let user = self
            .store
            .insert_user(NewUser {
                phone: registration.phone,
                hashed_password,
                full_name: registration.full_name,
                about: registration.about,
                avatar: registration.avatar,
                birth_date: registration.birth_date,
                rating: NewUser::DEFAULT_RATING,
            })
            .await
            .map_err(|e| phone_taken(e.into()))?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get(&self, id: UserId) -> Result<User> {
        self.store
            .user_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::User, id))
    }

    pub async fn list(&self, page: Page) -> Result<Vec<User>> {
        Ok(self.store.list_users(page).await?)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User> {
        if update.is_empty() {
            return Err(DomainError::Validation("No fields to update".to_string()));
        }

        let hashed_password = match update.password {
            Some(ref password) => {
                check_password(password)?;
                Some(auth::hash_password(password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            phone: update.phone,
            hashed_password,
            full_name: update.full_name,
            about: update.about,
            avatar: update.avatar,
            birth_date: update.birth_date,
        };

        self.store
            .update_user(id, changes)
            .await
            .map_err(|e| phone_taken(e.into()))?
            .ok_or_else(|| DomainError::not_found(Entity::User, id))
    }

    /// Deletes the account, its listings and its orders.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: UserId) -> Result<()> {
        if !self.store.delete_user(id).await? {
            return Err(DomainError::not_found(Entity::User, id));
        }
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    fn registration(phone: &str, password: &str) -> Registration {
        Registration {
            phone: phone.to_string(),
            password: password.to_string(),
            full_name: "Ada Lovelace".to_string(),
            about: None,
            avatar: None,
            birth_date: None,
        }
    }

    #[tokio::test]
    async fn register_hashes_password() {
        let service = UserService::new(InMemoryStore::new());

        let user = service
            .register(registration("+1111111111", "secret1"))
            .await
            .unwrap();

        assert_ne!(user.hashed_password, "secret1");
        assert!(auth::verify_password("secret1", &user.hashed_password).unwrap());
        assert_eq!(user.rating, 5.0);
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let service = UserService::new(InMemoryStore::new());

        let result = service.register(registration("+1111111111", "12345")).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_conflict() {
        let service = UserService::new(InMemoryStore::new());
        service
            .register(registration("+1111111111", "secret1"))
            .await
            .unwrap();

        let result = service
            .register(registration("+1111111111", "secret2"))
            .await;

        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(service.list(Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_profile_update_is_rejected() {
        let service = UserService::new(InMemoryStore::new());
        let user = service
            .register(registration("+1111111111", "secret1"))
            .await
            .unwrap();

        let result = service
            .update_profile(user.id, ProfileUpdate::default())
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn password_change_is_rehashed() {
        let service = UserService::new(InMemoryStore::new());
        let user = service
            .register(registration("+1111111111", "secret1"))
            .await
            .unwrap();

        let updated = service
            .update_profile(
                user.id,
                ProfileUpdate {
                    password: Some("better-secret".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(auth::verify_password("better-secret", &updated.hashed_password).unwrap());
        assert!(!auth::verify_password("secret1", &updated.hashed_password).unwrap());
    }

    #[tokio::test]
    async fn delete_missing_user() {
        let service = UserService::new(InMemoryStore::new());
        assert!(matches!(
            service.delete(UserId::new(5)).await,
            Err(DomainError::NotFound {
                entity: Entity::User,
                id: 5
            })
        ));
    }
}
