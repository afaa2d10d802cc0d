//! In-memory credential store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    normalize_email, now_unix_seconds, CredentialStore, NewUser, StoreError, User, UserUpdate,
};

/// Map-backed store with the same uniqueness rules as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn username_taken(users: &HashMap<Uuid, User>, username: &str, except: Option<Uuid>) -> bool {
    let wanted = username.to_lowercase();
    users
        .values()
        .any(|user| Some(user.id) != except && user.username.to_lowercase() == wanted)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let wanted = username.trim().to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.username.to_lowercase() == wanted)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let wanted = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == wanted).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at_unix
                .cmp(&a.created_at_unix)
                .then_with(|| a.username.cmp(&b.username))
        });
        let total = i64::try_from(all.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok((all.into_iter().skip(offset).take(limit).collect(), total))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        user.check_credential()?;
        let email = normalize_email(&user.email);

        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == email) {
            return Err(StoreError::Conflict("email"));
        }
        if username_taken(&users, &user.username, None) {
            return Err(StoreError::Conflict("username"));
        }

        let now = now_unix_seconds();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email,
            password_hash: user.password_hash,
            role: user.role,
            status: user.status,
            provider: user.provider,
            created_at_unix: now,
            updated_at_unix: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if let Some(username) = &update.username {
            if username_taken(&users, username, Some(id)) {
                return Err(StoreError::Conflict("username"));
            }
        }

        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = update.username {
            user.username = username;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(status) = update.status {
            user.status = status;
        }
        user.updated_at_unix = now_unix_seconds();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Role, UserStatus};
    use anyhow::{Context, Result};

    fn local(username: &str, email: &str) -> NewUser {
        NewUser::local(username.to_string(), email, "$2b$04$hash".to_string())
    }

    #[tokio::test]
    async fn create_then_find_by_every_key() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let created = store.create(local("Zoe", "zoe@gmail.com")).await?;

        let by_email = store.find_by_email(" ZOE@gmail.com").await?;
        assert_eq!(by_email.as_ref().map(|u| u.id), Some(created.id));

        let by_name = store.find_by_username("zoe").await?;
        assert_eq!(by_name.map(|u| u.id), Some(created.id));

        let by_id = store.find_by_id(created.id).await?.context("missing by id")?;
        assert_eq!(by_id.username, "Zoe");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store.create(local("zoe", "zoe@gmail.com")).await?;

        let same_email = store.create(local("other", "Zoe@Gmail.com")).await;
        assert!(matches!(same_email, Err(StoreError::Conflict("email"))));

        let same_name = store.create(local("ZOE", "other@gmail.com")).await;
        assert!(matches!(same_name, Err(StoreError::Conflict("username"))));
        Ok(())
    }

    #[tokio::test]
    async fn update_changes_only_requested_fields() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let user = store.create(local("zoe", "zoe@gmail.com")).await?;

        let updated = store
            .update(
                user.id,
                UserUpdate {
                    role: Some(Role::Admin),
                    ..UserUpdate::default()
                },
            )
            .await?
            .context("user vanished")?;
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.status, UserStatus::Unverified);
        assert_eq!(updated.username, "zoe");

        let missing = store.update(Uuid::new_v4(), UserUpdate::default()).await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn rename_to_taken_username_conflicts() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store.create(local("zoe", "zoe@gmail.com")).await?;
        let max = store.create(local("max", "max@gmail.com")).await?;

        let result = store
            .update(
                max.id,
                UserUpdate {
                    username: Some("Zoe".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict("username"))));
        Ok(())
    }

    #[tokio::test]
    async fn list_pages_and_counts() -> Result<()> {
        let store = MemoryCredentialStore::new();
        for index in 0..5 {
            store
                .create(local(&format!("user{index}"), &format!("u{index}@mail.test")))
                .await?;
        }
        let (page, total) = store.list(2, 2).await?;
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (tail, _) = store.list(4, 10).await?;
        assert_eq!(tail.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_whether_removed() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let user = store.create(local("zoe", "zoe@gmail.com")).await?;
        assert!(store.delete(user.id).await?);
        assert!(!store.delete(user.id).await?);
        assert!(store.find_by_id(user.id).await?.is_none());
        Ok(())
    }
}
