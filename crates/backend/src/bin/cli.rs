use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared_types::{
    CreateTagRequest, EmailListResponse, HealthResponse, HealthStatus, SearchResponse, Tag,
    UserResponse, UserTagRequest,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "spamwatch-cli")]
#[command(about = "CLI for checking spam health and managing users via the backend API")]
#[command(
    long_about = "A command-line interface for the spamwatch backend server.\n\n\
    Checks whether a sender's mail lands in spam across the onboarded Gmail\n\
    mailboxes, searches those mailboxes, and manages user tags."
)]
struct Cli {
    /// Backend server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:3000",
        env = "SPAMWATCH_API_URL"
    )]
    base_url: String,

    /// Session token, sent as a bearer token.
    ///
    /// This is the value of the session cookie issued after signing in
    /// through the browser.
    #[arg(short, long, env = "SPAMWATCH_TOKEN", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the monitored mailboxes
    Emails,

    /// Check where mail from a sender lands
    ///
    /// By default stops at the first mailbox holding the sender's mail in
    /// spam and prints only the verdict. Use --full to check every mailbox
    /// and print per-mailbox results.
    Health {
        /// Sender address to check, e.g. newsletter@example.com
        email: String,

        /// Query every mailbox and show per-mailbox counts.
        #[arg(short, long)]
        full: bool,
    },

    /// Find messages from a sender in every authenticated mailbox
    Search {
        /// Sender address to search for.
        query: String,
    },

    /// List users with their tags and token state
    Users,

    /// Manage tags and tag assignments
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// List all tags
    List,

    /// Create a tag (returns the existing one if the name is taken)
    Create {
        /// Tag name. Users tagged "admin" are excluded from health checks.
        name: String,
    },

    /// Permanently delete a tag and its assignments
    Delete { id: Uuid },

    /// Show the tags of a user
    Show {
        /// The UUID of the user. Use 'users' to find it.
        user: Uuid,
    },

    /// Attach a tag to a user
    Attach { user: Uuid, tag: Uuid },

    /// Remove a tag from a user
    Detach { user: Uuid, tag: Uuid },
}

struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed ({}): {}", status, body);
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> anyhow::Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .context("Unexpected response body")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api = ApiClient {
        client: Client::new(),
        base_url: cli.base_url,
        token: cli.token,
    };

    match cli.command {
        Commands::Emails => {
            let list: EmailListResponse = api.json(api.client.get(api.url("/api/emails/list"))).await?;
            if list.emails.is_empty() {
                println!("No mailboxes found.");
            }
            for email in list.emails {
                println!("{}", email);
            }
        }
        Commands::Health { email, full } => {
            let mode = if full { "full" } else { "quick" };
            let request = api
                .client
                .get(api.url("/api/emails/health"))
                .query(&[("email", email.as_str()), ("mode", mode)]);
            let health: HealthResponse = api.json(request).await?;
            print_health(&email, &health);
        }
        Commands::Search { query } => {
            let request = api
                .client
                .get(api.url("/api/emails/search"))
                .query(&[("q", query.as_str())]);
            let results: SearchResponse = api.json(request).await?;
            if results.messages.is_empty() {
                println!("No messages found.");
            }
            for message in results.messages {
                let received = message
                    .received_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{:5}] {} {} | {}",
                    message.location.as_str(),
                    received,
                    message.user_email,
                    message.subject
                );
            }
        }
        Commands::Users => {
            let users: Vec<UserResponse> = api.json(api.client.get(api.url("/api/users"))).await?;
            if users.is_empty() {
                println!("No users found.");
            }
            for user in users {
                let tags: Vec<&str> = user.tags.iter().map(|t| t.name.as_str()).collect();
                let token_state = match (user.has_access_token, user.has_refresh_token) {
                    (true, true) => "connected",
                    (true, false) => "no refresh token",
                    _ => "not connected",
                };
                println!(
                    "[{}] {} ({}) {}",
                    &user.id.to_string()[..8],
                    user.email,
                    token_state,
                    tags.join(", ")
                );
            }
        }
        Commands::Tags { action } => handle_tags(&api, action).await?,
    }

    Ok(())
}

fn status_symbol(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Good => "✓",
        HealthStatus::Bad => "✗",
        HealthStatus::Unknown => "?",
    }
}

fn print_health(sender: &str, health: &HealthResponse) {
    let status = health.status();
    println!("{} {}: {}", status_symbol(status), sender, status.as_str());

    if let HealthResponse::Full(summary) = health {
        println!(
            "    {} spam messages across {} mailboxes",
            summary.total_spam_count, summary.total_users
        );
        for result in &summary.results {
            let detail = match (&result.match_count, &result.error) {
                (Some(count), _) => format!("{} in spam", count),
                (None, Some(error)) => error.clone(),
                (None, None) => "not checked".to_string(),
            };
            println!(
                "    {} {} ({})",
                status_symbol(result.status),
                result.user_email,
                detail
            );
        }
    }
}

fn print_tags(tags: &[Tag]) {
    if tags.is_empty() {
        println!("No tags.");
    }
    for tag in tags {
        println!("[{}] {}", &tag.id.to_string()[..8], tag.name);
    }
}

async fn handle_tags(api: &ApiClient, action: TagAction) -> anyhow::Result<()> {
    match action {
        TagAction::List => {
            let tags: Vec<Tag> = api.json(api.client.get(api.url("/api/tags"))).await?;
            print_tags(&tags);
        }
        TagAction::Create { name } => {
            let request = api
                .client
                .post(api.url("/api/tags"))
                .json(&CreateTagRequest { name });
            let tag: Tag = api.json(request).await?;
            println!("Created tag: [{}] {}", &tag.id.to_string()[..8], tag.name);
        }
        TagAction::Delete { id } => {
            api.send(api.client.delete(api.url(&format!("/api/tags/{}", id))))
                .await?;
            println!("Deleted tag: {}", id);
        }
        TagAction::Show { user } => {
            let url = api.url(&format!("/api/users/{}/tags", user));
            let tags: Vec<Tag> = api.json(api.client.get(url)).await?;
            print_tags(&tags);
        }
        TagAction::Attach { user, tag } => {
            let request = api
                .client
                .post(api.url(&format!("/api/users/{}/tags", user)))
                .json(&UserTagRequest { tag_id: tag });
            let tags: Vec<Tag> = api.json(request).await?;
            print_tags(&tags);
        }
        TagAction::Detach { user, tag } => {
            let request = api
                .client
                .delete(api.url(&format!("/api/users/{}/tags", user)))
                .json(&UserTagRequest { tag_id: tag });
            let tags: Vec<Tag> = api.json(request).await?;
            print_tags(&tags);
        }
    }

    Ok(())
}
