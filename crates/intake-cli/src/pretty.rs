//! Terminal output for the intake CLI.

use chrono::{DateTime, Utc};
use console::{Style, Term, style};
use intake_core::models::{
    Application, ApplicationCategory, Conversation, ConversationStatus, ConversationWithMessages,
    Document, Message, MessageRole, Notification, User,
};

/// Terminal width for formatting, with fallback.
fn term_width() -> usize {
    let (_, cols) = Term::stdout().size();
    usize::from(cols).clamp(40, 100)
}

/// Format a relative time string (e.g., "2 days ago", "just now").
fn relative_time(dt: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(dt);

    if duration.num_seconds() < 60 {
        return "just now".to_string();
    }
    if duration.num_minutes() < 60 {
        let mins = duration.num_minutes();
        return format!("{mins} min{s} ago", s = if mins == 1 { "" } else { "s" });
    }
    if duration.num_hours() < 24 {
        let hours = duration.num_hours();
        return format!("{hours} hour{s} ago", s = if hours == 1 { "" } else { "s" });
    }
    if duration.num_days() < 7 {
        let days = duration.num_days();
        return format!("{days} day{s} ago", s = if days == 1 { "" } else { "s" });
    }

    dt.format("%Y-%m-%d").to_string()
}

fn role_style(role: MessageRole) -> Style {
    match role {
        MessageRole::User => Style::new().cyan().bold(),
        MessageRole::Assistant => Style::new().green().bold(),
    }
}

fn status_style(status: ConversationStatus) -> Style {
    match status {
        ConversationStatus::Pending => Style::new().dim(),
        ConversationStatus::InReview => Style::new().yellow(),
        ConversationStatus::Approved | ConversationStatus::Completed => Style::new().green(),
        ConversationStatus::Rejected => Style::new().red(),
    }
}

fn category_style(category: ApplicationCategory) -> Style {
    match category {
        ApplicationCategory::Internal => Style::new().blue(),
        ApplicationCategory::External => Style::new().magenta(),
        ApplicationCategory::Proposed => Style::new().yellow(),
    }
}

/// Wrap text to the terminal width, indenting continuation lines.
fn wrap_text(s: &str, indent: usize) -> String {
    let width = term_width().saturating_sub(indent);
    let pad = " ".repeat(indent);
    s.lines()
        .flat_map(|line| {
            if line.is_empty() {
                vec![String::new()]
            } else {
                textwrap::wrap(line, width)
                    .into_iter()
                    .map(|cow| cow.into_owned())
                    .collect()
            }
        })
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rule() -> String {
    "─".repeat(term_width())
}

pub fn print_users(users: &[User]) {
    if users.is_empty() {
        println!("{}", style("No users.").dim());
        return;
    }
    for user in users {
        let admin = if user.is_admin {
            style(" admin").red().to_string()
        } else {
            String::new()
        };
        println!("{}  {} <{}>{admin}", style(user.id).dim(), user.username, user.email);
    }
}

pub fn print_applications(applications: &[Application]) {
    if applications.is_empty() {
        println!("{}", style("No applications.").dim());
        return;
    }
    for app in applications {
        println!(
            "{}  {:<9} {}{}",
            style(app.id).dim(),
            category_style(app.category).apply_to(app.category),
            style(&app.name).bold(),
            if app.is_automated { " (automated)" } else { "" }
        );
    }
}

pub fn print_application(app: &Application) {
    println!("{}", style(&app.name).bold());
    println!("  id:        {}", app.id);
    println!("  category:  {}", category_style(app.category).apply_to(app.category));
    println!("  automated: {}", app.is_automated);
    for (label, value) in [
        ("status", app.status.as_deref()),
        ("url", app.url.as_deref()),
        ("repo", app.repo.as_deref()),
        ("summary", app.short_description.as_deref()),
    ] {
        if let Some(value) = value {
            println!("  {label:<10} {value}");
        }
    }
    if let Some(source) = app.source_conversation_id {
        println!("  proposed from conversation {source}");
    }
    if let Some(overview) = app.overview.as_deref().filter(|o| !o.is_empty()) {
        println!("\n{}", style("Overview").underlined());
        println!("{}", wrap_text(overview, 2));
    }
}

pub fn print_conversations(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("{}", style("No conversations.").dim());
        return;
    }
    for conv in conversations {
        let signed = if conv.is_signed_off() { " signed-off" } else { "" };
        println!(
            "{}  {:<10} {}{}  {}",
            style(conv.id).dim(),
            status_style(conv.status).apply_to(conv.status),
            conv.title.as_deref().unwrap_or("(untitled)"),
            style(signed).cyan(),
            style(relative_time(conv.updated_at)).dim().italic()
        );
    }
}

pub fn print_conversation(full: &ConversationWithMessages) {
    let conv = &full.conversation;
    println!("{}", style(rule()).dim());
    println!(
        " {}  {}",
        style(conv.title.as_deref().unwrap_or("(untitled)")).bold(),
        status_style(conv.status).apply_to(conv.status)
    );
    println!(" {}", style(conv.id).dim());
    match conv.application_id {
        Some(app) => println!(" {}", style(format!("application {app}")).dim()),
        None => println!(" {}", style("new application request").dim()),
    }
    if let Some(signed_off_at) = conv.signed_off_at {
        println!(
            " {}",
            style(format!("signed off {}", relative_time(signed_off_at))).cyan()
        );
    }
    if let Some(summary) = conv.summary.as_deref() {
        println!("\n{}", wrap_text(summary, 1));
    }
    println!("{}", style(rule()).dim());

    for message in &full.messages {
        print_message(message);
    }
}

pub fn print_message(message: &Message) {
    let role = message.role();
    println!(
        "{} {}",
        role_style(role).apply_to(role),
        style(relative_time(message.created_at)).dim().italic()
    );
    println!("{}\n", wrap_text(&message.content, 2));
}

pub fn print_documents(documents: &[Document]) {
    if documents.is_empty() {
        println!("{}", style("No documents yet.").dim());
        return;
    }
    for doc in documents {
        println!(
            "{}  {:<20} {}  {}",
            style(doc.id).dim(),
            style(doc.document_type).cyan(),
            style(&doc.name).bold(),
            style(relative_time(doc.created_at)).dim().italic()
        );
    }
}

pub fn print_document(doc: &Document) {
    println!("{}", style(rule()).dim());
    println!(" {}  {}", style(&doc.name).bold(), style(doc.document_type).cyan());
    println!(" {}", style(format!("conversation {}", doc.conversation_id)).dim());
    if let Some(metadata) = &doc.metadata {
        for (key, value) in metadata {
            let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            println!(" {}", style(format!("{key}: {value}")).dim());
        }
    }
    println!("{}", style(rule()).dim());
    println!("{}", doc.content);
}

pub fn print_notifications(notifications: &[Notification]) {
    if notifications.is_empty() {
        println!("{}", style("No notifications.").dim());
        return;
    }
    for notification in notifications {
        let detail = notification.payload["name"].as_str().unwrap_or_default();
        println!(
            "{}  {:<20} {}",
            style(relative_time(notification.created_at)).dim().italic(),
            style(notification.kind).yellow(),
            detail
        );
    }
}
