use uuid::Uuid;

use super::{
    project::{CreateProject, Project},
    user::{CreateUser, User},
};
use crate::DBService;

pub async fn db() -> DBService {
    DBService::new_in_memory().await.unwrap()
}

pub async fn user(db: &DBService, name: &str) -> User {
    User::create(
        &db.pool,
        &CreateUser {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            full_name: None,
            password_hash: "hash".to_string(),
            role_id: None,
        },
        Uuid::new_v4(),
    )
    .await
    .unwrap()
}

pub async fn project(db: &DBService, owner: Uuid, name: &str, parent_id: Option<Uuid>) -> Project {
    Project::create(
        &db.pool,
        &CreateProject {
            name: name.to_string(),
            description: None,
            status: None,
            priority: None,
            parent_id,
            start_date: None,
            end_date: None,
            color: None,
        },
        owner,
        Uuid::new_v4(),
    )
    .await
    .unwrap()
}
