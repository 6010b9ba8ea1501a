//! Demo data for `kata serve --seed`.

use anyhow::{Context as AnyhowContext, Result};
use kata_rpc::{to_row, DbHandle, Role, SessionUser};

use crate::app::models::{unix_ms_now, Difficulty, Exercise, EXERCISES, USERS};
use crate::sessions::issue_session;

pub const ADMIN_ID: &str = "admin";
pub const MEMBER_ID: &str = "ada";

#[derive(Debug, Clone)]
pub struct SeedTokens {
    pub admin: String,
    pub member: String,
}

pub async fn seed_demo(db: &DbHandle) -> Result<SeedTokens> {
    let users = [
        SessionUser {
            id: ADMIN_ID.to_string(),
            name: "Grace Admin".to_string(),
            email: "admin@kata.test".to_string(),
            role: Role::Admin,
            banned: false,
        },
        SessionUser {
            id: MEMBER_ID.to_string(),
            name: "Ada Member".to_string(),
            email: "ada@kata.test".to_string(),
            role: Role::User,
            banned: false,
        },
    ];
    for user in &users {
        db.insert(USERS, to_row(user)?)
            .await
            .with_context(|| format!("seeding user {}", user.id))?;
    }

    let exercises = [
        ("two-sum", "Two sum", Difficulty::Easy, "arrays"),
        ("lru-cache", "LRU cache", Difficulty::Medium, "design"),
    ];
    for (slug, title, difficulty, tag) in exercises {
        let exercise = Exercise {
            id: String::new(),
            slug: slug.to_string(),
            title: title.to_string(),
            description: String::new(),
            difficulty,
            tags: vec![tag.to_string()],
            author_id: ADMIN_ID.to_string(),
            created_ms: unix_ms_now(),
        };
        db.insert(EXERCISES, to_row(&exercise)?)
            .await
            .with_context(|| format!("seeding exercise {slug}"))?;
    }

    Ok(SeedTokens {
        admin: issue_session(db, ADMIN_ID, None).await?,
        member: issue_session(db, MEMBER_ID, None).await?,
    })
}
