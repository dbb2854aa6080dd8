//! Board and timeline shapes of a project's tasks.

use chrono::{DateTime, Duration, Utc};
use db::models::{
    project::Project,
    task::{Task, TaskStatus},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct KanbanColumn {
    pub status: TaskStatus,
    #[ts(type = "number")]
    pub count: usize,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct KanbanBoard {
    pub project_id: Uuid,
    pub columns: Vec<KanbanColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GanttItem {
    pub id: Uuid,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[ts(type = "number")]
    pub progress: u8,
    pub status: TaskStatus,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GanttChart {
    pub project_id: Uuid,
    pub project_name: String,
    /// Earliest start over the project and its items, absent when there is nothing to place
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub items: Vec<GanttItem>,
}

/// One column per status, in workflow order, always all four.
pub fn kanban(project_id: Uuid, tasks: Vec<Task>) -> KanbanBoard {
    let mut columns: Vec<KanbanColumn> = TaskStatus::iter()
        .map(|status| KanbanColumn {
            status,
            count: 0,
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
            column.tasks.push(task);
        }
    }
    for column in &mut columns {
        column
            .tasks
            .sort_by(|a, b| a.position.cmp(&b.position).then(a.created_at.cmp(&b.created_at)));
        column.count = column.tasks.len();
    }

    KanbanBoard { project_id, columns }
}

pub fn status_progress(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Todo => 0,
        TaskStatus::InProgress => 50,
        TaskStatus::Review => 75,
        TaskStatus::Done => 100,
    }
}

impl From<&Task> for GanttItem {
    fn from(task: &Task) -> Self {
        let start = task.start_date.unwrap_or(task.created_at);
        let end = task
            .due_date
            .unwrap_or(start + Duration::days(1))
            .max(start);
        GanttItem {
            id: task.id,
            title: task.title.clone(),
            start,
            end,
            progress: status_progress(task.status),
            status: task.status,
            assignee_id: task.assignee_id,
        }
    }
}

pub fn gantt(project: &Project, tasks: &[Task]) -> GanttChart {
    let mut items: Vec<GanttItem> = tasks.iter().map(GanttItem::from).collect();
    items.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));

    let start = items
        .iter()
        .map(|i| i.start)
        .chain(project.start_date)
        .min();
    let end = items.iter().map(|i| i.end).chain(project.end_date).max();

    GanttChart {
        project_id: project.id,
        project_name: project.name.clone(),
        start,
        end,
        items,
    }
}

#[cfg(test)]
mod tests {
    use db::models::{priority::Priority, project::ProjectStatus};

    use super::*;

    fn task(title: &str, status: TaskStatus, position: i64) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            title: title.to_string(),
            description: None,
            status,
            priority: Priority::Medium,
            assignee_id: None,
            created_by: Uuid::nil(),
            start_date: None,
            due_date: None,
            estimated_hours: None,
            position,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn project() -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            name: "Launch".to_string(),
            description: None,
            status: ProjectStatus::Active,
            priority: Priority::High,
            parent_id: None,
            owner_id: Uuid::nil(),
            start_date: None,
            end_date: None,
            color: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn kanban_has_four_ordered_columns() {
        let board = kanban(
            Uuid::nil(),
            vec![
                task("second", TaskStatus::Todo, 2),
                task("shipped", TaskStatus::Done, 0),
                task("first", TaskStatus::Todo, 1),
            ],
        );
        let statuses: Vec<TaskStatus> = board.columns.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Todo,
                TaskStatus::InProgress,
                TaskStatus::Review,
                TaskStatus::Done
            ]
        );
        let todo: Vec<&str> = board.columns[0].tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(todo, vec!["first", "second"]);
        assert_eq!(board.columns[0].count, 2);
        assert_eq!(board.columns[1].count, 0);
        assert_eq!(board.columns[3].count, 1);
    }

    #[test]
    fn gantt_defaults_and_clamps_dates() {
        let mut undated = task("undated", TaskStatus::InProgress, 0);
        let mut backwards = task("backwards", TaskStatus::Review, 0);
        let start = Utc::now();
        backwards.start_date = Some(start);
        backwards.due_date = Some(start - Duration::days(3));
        undated.created_at = start - Duration::days(1);

        let mut project = project();
        project.end_date = Some(start + Duration::days(30));
        let chart = gantt(&project, &[undated.clone(), backwards]);

        let first = &chart.items[0];
        assert_eq!(first.title, "undated");
        assert_eq!(first.start, undated.created_at);
        assert_eq!(first.end, undated.created_at + Duration::days(1));
        assert_eq!(first.progress, 50);

        let second = &chart.items[1];
        assert_eq!(second.start, second.end);
        assert_eq!(second.progress, 75);

        assert_eq!(chart.start, Some(undated.created_at));
        assert_eq!(chart.end, project.end_date);
    }

    #[test]
    fn empty_gantt_has_no_span() {
        let chart = gantt(&project(), &[]);
        assert!(chart.items.is_empty());
        assert!(chart.start.is_none() && chart.end.is_none());
    }
}
