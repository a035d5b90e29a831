//! Terminal output formatting.

use colored::Colorize;
use tasksync_core::task::model::Task;

/// Print tasks as a table.
pub fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("{}", "No tasks found. Create one with 'tasksync task new <title>'.".dimmed());
        return;
    }

    println!("{:<10} {:<40} {:<6} {:<25}", "ID", "Title", "Done", "Updated");
    println!("{}", "-".repeat(84));

    for task in tasks {
        let done = if task.completed { "✓".green() } else { "·".dimmed() };
        println!(
            "{:<10} {:<40} {:<6} {:<25}",
            short_id(&task.id),
            truncate(&task.title, 38),
            done,
            task.updated_at.dimmed()
        );
    }

    let completed = tasks.iter().filter(|t| t.completed).count();
    println!();
    println!(
        "{} tasks, {} completed",
        tasks.len().to_string().bold(),
        completed.to_string().green()
    );
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
