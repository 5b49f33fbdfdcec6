mod client;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::{Number, Value};
use smartscripts_core::{override_changes, FeedbackUpdate, ReviewEvent, ReviewEventType};

use client::ReviewClient;

/// Command-line client for the SmartScripts review service
#[derive(Parser, Debug)]
#[command(name = "smartscripts-reviews")]
#[command(about = "Inspect and update teacher reviews of exam submissions", long_about = None)]
struct Cli {
    /// Base URL of the review service
    #[arg(
        long,
        global = true,
        env = "SMARTSCRIPTS_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the review for a submission
    Show(ShowArgs),
    /// Set feedback, comments or score overrides for a submission
    Feedback(FeedbackArgs),
    /// List all reviews
    List,
    /// Print the audit trail for a submission
    History(HistoryArgs),
}

#[derive(Parser, Debug)]
struct ShowArgs {
    submission_id: String,
}

#[derive(Parser, Debug)]
struct FeedbackArgs {
    submission_id: String,

    /// Overall feedback text (replaces the current feedback)
    #[arg(long)]
    feedback: Option<String>,

    /// Teacher comment; repeat for several. Replaces all current comments
    #[arg(long = "comment")]
    comments: Vec<String>,

    /// Remove all comments
    #[arg(long, conflicts_with = "comments")]
    clear_comments: bool,

    /// Score override as QUESTION=SCORE; repeat for several. Replaces all current overrides
    #[arg(long = "override", value_parser = parse_override)]
    overrides: Vec<(String, Number)>,

    /// Remove all overrides
    #[arg(long, conflicts_with = "overrides")]
    clear_overrides: bool,
}

#[derive(Parser, Debug)]
struct HistoryArgs {
    submission_id: String,

    /// Maximum number of events to show
    #[arg(long)]
    limit: Option<usize>,
}

/// Parse `question=score`, where score is a JSON number.
fn parse_override(s: &str) -> Result<(String, Number), String> {
    let (question, score) = s
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION=SCORE, got '{}'", s))?;

    let question = question.trim();
    if question.is_empty() {
        return Err(format!("missing question id in '{}'", s));
    }

    let score: Number = serde_json::from_str(score.trim())
        .map_err(|_| format!("score '{}' is not a number", score.trim()))?;

    Ok((question.to_string(), score))
}

/// Only the fields the user asked to change end up in the update.
fn build_update(args: &FeedbackArgs) -> FeedbackUpdate {
    let comments = (args.clear_comments || !args.comments.is_empty()).then(|| {
        args.comments
            .iter()
            .map(|comment| Value::String(comment.clone()))
            .collect()
    });
    let overrides = (args.clear_overrides || !args.overrides.is_empty()).then(|| {
        args.overrides
            .iter()
            .map(|(question, score)| (question.clone(), Value::Number(score.clone())))
            .collect()
    });

    FeedbackUpdate {
        feedback: args.feedback.clone(),
        comments,
        overrides,
    }
}

fn describe_event(event: &ReviewEvent) -> String {
    let when = chrono::DateTime::from_timestamp(event.recorded_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| event.recorded_at.to_string());

    let detail = match &event.event_type {
        ReviewEventType::Created => "review created".to_string(),
        ReviewEventType::FeedbackUpdated { fields } => format!(
            "updated {}",
            fields
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        ReviewEventType::OverridesReplaced { previous, current } => {
            let changes = override_changes(previous, current);
            if changes.is_empty() {
                "overrides unchanged".to_string()
            } else {
                let show = |v: Option<&Value>| v.map_or("-".to_string(), |v| v.to_string());
                let described: Vec<String> = changes
                    .iter()
                    .map(|(q, before, after)| {
                        format!("{}: {} -> {}", q, show(*before), show(*after))
                    })
                    .collect();
                format!("overrides {}", described.join(", "))
            }
        }
    };

    format!("#{} {} {}", event.id, when, detail)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ReviewClient::new(&cli.server);

    match cli.command {
        Commands::Show(args) => {
            let record = client
                .get_review(&args.submission_id)
                .await?
                .ok_or_else(|| {
                    anyhow!("Review not found for submissionId {}", args.submission_id)
                })?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Feedback(args) => {
            let update = build_update(&args);
            if update.is_empty() {
                eprintln!("No fields given; the review will be created if missing but not changed");
            }
            let record = client.post_feedback(&args.submission_id, &update).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::List => {
            let list = client.list_reviews().await?;
            if list.reviews.is_empty() {
                println!("No reviews (service v{})", list.version);
            }
            for review in list.reviews {
                println!(
                    "{}\t{}\t{}/{} ({}%)\tcomments: {}\toverrides: {}",
                    review.submission_id,
                    if review.student_name.is_empty() {
                        "-"
                    } else {
                        review.student_name.as_str()
                    },
                    review.total_score,
                    review.max_score,
                    review.percentage,
                    review.comment_count,
                    review.override_count
                );
            }
        }
        Commands::History(args) => {
            let history = client.history(&args.submission_id, args.limit).await?;
            println!("History for {}:", history.submission_id);
            for event in &history.events {
                println!("  {}", describe_event(event));
            }
        }
    }

    Ok(())
}
