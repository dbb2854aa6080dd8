use std::{env, fs, path::PathBuf};

use ts_rs::TS;

fn generate_types_content() -> String {
    let decls = [
        utils::response::ApiResponse::<()>::decl(),
        db::models::priority::Priority::decl(),
        db::models::role::Permission::decl(),
        db::models::role::Role::decl(),
        db::models::role::CreateRole::decl(),
        db::models::role::UpdateRole::decl(),
        db::models::user::UserResponse::decl(),
        db::models::user::UpdateProfile::decl(),
        db::models::project::ProjectStatus::decl(),
        db::models::project::Project::decl(),
        db::models::project::ProjectWithStats::decl(),
        db::models::project::CreateProject::decl(),
        db::models::project::UpdateProject::decl(),
        db::models::project::ProjectFilter::decl(),
        db::models::project_member::MemberRole::decl(),
        db::models::project_member::ProjectMember::decl(),
        db::models::project_member::ProjectMemberWithUser::decl(),
        db::models::project_member::AddProjectMember::decl(),
        db::models::project_member::UpdateProjectMember::decl(),
        db::models::task::TaskStatus::decl(),
        db::models::task::Task::decl(),
        db::models::task::CreateTask::decl(),
        db::models::task::UpdateTask::decl(),
        db::models::task::UpdateTaskStatus::decl(),
        db::models::task::TaskFilter::decl(),
        db::models::note::Note::decl(),
        db::models::note::CreateNote::decl(),
        db::models::note::UpdateNote::decl(),
        db::models::note::NoteFilter::decl(),
        db::models::todo::Todo::decl(),
        db::models::todo::CreateTodo::decl(),
        db::models::todo::UpdateTodo::decl(),
        db::models::todo::TodoFilter::decl(),
        db::models::notification::NotificationKind::decl(),
        db::models::notification::Notification::decl(),
        db::models::notification::NotificationQuery::decl(),
        db::models::ai_usage_log::AiFeature::decl(),
        db::models::ai_usage_log::AiUsageLog::decl(),
        db::models::ai_usage_log::AiFeatureUsage::decl(),
        db::models::ai_usage_log::AiUsageSummary::decl(),
        services::services::auth::RegisterRequest::decl(),
        services::services::auth::LoginRequest::decl(),
        services::services::auth::ChangePasswordRequest::decl(),
        services::services::auth::AuthResponse::decl(),
        services::services::project_tree::ProjectNode::decl(),
        services::services::project_tree::ProjectTreeFilter::decl(),
        services::services::task_views::KanbanColumn::decl(),
        services::services::task_views::KanbanBoard::decl(),
        services::services::task_views::GanttItem::decl(),
        services::services::task_views::GanttChart::decl(),
        services::services::text_analysis::TextSource::decl(),
        services::services::text_analysis::KeywordCount::decl(),
        services::services::text_analysis::SummarizeRequest::decl(),
        services::services::text_analysis::Summary::decl(),
        services::services::text_analysis::TextRequest::decl(),
        services::services::text_analysis::TextAnalysis::decl(),
        services::services::text_analysis::ImprovedText::decl(),
        services::services::text_analysis::SuggestedTask::decl(),
        services::services::text_analysis::TaskSuggestions::decl(),
        services::services::database_validator::ValidationResult::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::users::SetUserRole::decl(),
        server::routes::users::SetUserActive::decl(),
        server::routes::todos::ClearedTodos::decl(),
        server::routes::notifications::UnreadCount::decl(),
        server::routes::notifications::MarkedRead::decl(),
        server::routes::ai::UsageQuery::decl(),
        server::routes::ai::UsageLogQuery::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| format!("export {}", d.trim_start_matches("export ")))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("// This file was generated by `generate_types`. Do not edit it by hand.\n\n{body}\n")
}

fn main() -> std::io::Result<()> {
    let out = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shared/types.ts"));
    if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    fs::write(&out, generate_types_content())?;
    println!("Wrote TypeScript types to {}", out.display());
    Ok(())
}
