pub mod access;
pub mod auth;
pub mod claude_api;
pub mod database_validator;
pub mod notification;
pub mod project_tree;
pub mod task_views;
pub mod text_analysis;
