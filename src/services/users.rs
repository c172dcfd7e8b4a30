//! User directory lookups
//!
//! Read-only view on the `users` collection, used for role re-checks and for
//! person name visibility.

use std::collections::HashMap;

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;

use crate::auth::Role;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::types::Result;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>>;

    /// Batch lookup; unknown e-mails are simply absent from the result
    async fn find_by_emails(&self, emails: &[String]) -> Result<Vec<UserDoc>>;

    /// Directory role of `email` when it is expert or above
    async fn privileged_role(&self, email: &str) -> Result<Option<Role>> {
        Ok(self
            .find_by_email(email)
            .await?
            .map(|user| user.role)
            .filter(|role| role.is_privileged()))
    }

    async fn is_expert_or_admin(&self, email: &str) -> Result<bool> {
        Ok(self.privileged_role(email).await?.is_some())
    }
}

pub struct MongoUserDirectory {
    users: MongoCollection<UserDoc>,
}

impl MongoUserDirectory {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        Ok(Self { users })
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        self.users
            .find_one(doc! { "email": email.trim().to_lowercase() })
            .await
    }

    async fn find_by_emails(&self, emails: &[String]) -> Result<Vec<UserDoc>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }
        let emails: Vec<String> = emails.iter().map(|e| e.trim().to_lowercase()).collect();
        self.users.find_many(doc! { "email": { "$in": emails } }).await
    }
}

/// Directory backed by a map, for tests and dev mode
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserDoc>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserDoc>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.upsert(user);
        }
        directory
    }

    pub fn upsert(&self, user: UserDoc) {
        self.users.insert(user.email.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        Ok(self
            .users
            .get(&email.trim().to_lowercase())
            .map(|u| u.value().clone()))
    }

    async fn find_by_emails(&self, emails: &[String]) -> Result<Vec<UserDoc>> {
        let mut found: HashMap<String, UserDoc> = HashMap::new();
        for email in emails {
            let email = email.trim().to_lowercase();
            if let Some(user) = self.users.get(&email) {
                found.insert(email, user.value().clone());
            }
        }
        Ok(found.into_values().collect())
    }
}
