use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;

const TOKEN_FILE: &str = ".surprise_sender_token";

#[derive(Parser)]
#[command(name = "surprise-cli")]
#[command(about = "CLI for the Surprise Sender REST API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:11111")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short = 'n', long)]
        full_name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        company: Option<String>,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    Whoami,
    Activities {
        /// Another user's id (admin only)
        #[arg(short, long)]
        user_id: Option<String>,
    },
    Users,
    SmtpList,
    SmtpImport {
        /// File with one host:port:user:pass[:label] entry per line
        #[arg(short, long)]
        file: String,
    },
    DraftSave {
        #[arg(short, long)]
        to: String,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long, default_value = "")]
        body: String,
        #[arg(long)]
        html: bool,
    },
    DraftList,
    DraftDelete {
        #[arg(short, long)]
        subject: String,
    },
    Send {
        #[arg(short, long)]
        to: String,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        body: String,
        #[arg(long)]
        html: bool,
    },
    CampaignEmail {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        body: String,
        /// Comma-separated addresses
        #[arg(short, long)]
        recipients: String,
        #[arg(long)]
        smtp_id: String,
        /// RFC 3339 timestamp
        #[arg(long)]
        schedule_at: Option<String>,
    },
    CampaignSms {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        message: String,
        #[arg(short, long)]
        recipients: String,
        #[arg(long)]
        sender_id: String,
        #[arg(short, long)]
        gateway: String,
        #[arg(long)]
        schedule_at: Option<String>,
    },
    Campaigns,
    Suggest {
        #[arg(short, long)]
        prompt: String,
    },
    Agents,
    AgentSend {
        /// Agent id, see `agents`
        #[arg(short, long)]
        agent: String,
        #[arg(short, long)]
        to: String,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        body: String,
    },
    SupportHistory,
    SupportAsk {
        #[arg(short, long)]
        text: String,
    },
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn authed(builder: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    builder.header("Authorization", format!("Bearer {}", token.trim()))
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    // Pretty-print JSON bodies, fall back to raw text
    let shown = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or(text);
    if status.is_success() {
        println!("{}", shown);
    } else {
        println!("Request failed ({}): {}", status, shown);
    }
    Ok(())
}

async fn save_token(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if res.status().is_success() {
        let body: LoginResponse = res.json().await?;
        fs::write(TOKEN_FILE, body.token)?;
        println!("Logged in. Token saved to {}", TOKEN_FILE);
    } else {
        println!("Login failed: {}", res.text().await?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Register { full_name, email, password, company } => {
            let res = client.post(format!("{}/register", base))
                .json(&json!({
                    "fullName": full_name,
                    "email": email,
                    "company": company,
                    "password": password,
                    "confirmPassword": password,
                }))
                .send()
                .await?;
            save_token(res).await?;
        }
        Commands::Login { email, password } => {
            let res = client.post(format!("{}/login", base))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            save_token(res).await?;
        }
        Commands::Logout => {
            let res = authed(client.post(format!("{}/logout", base))).send().await?;
            print_response(res).await?;
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Token removed");
        }
        Commands::Whoami => {
            let res = authed(client.get(format!("{}/me", base))).send().await?;
            print_response(res).await?;
        }
        Commands::Activities { user_id } => {
            let url = match user_id {
                Some(id) => {
                    let mut url = Url::parse(&base)?;
                    url.path_segments_mut()
                        .map_err(|_| "base URL cannot carry a path")?
                        .pop_if_empty()
                        .extend(["users", id.as_str(), "activities"]);
                    url.to_string()
                }
                None => format!("{}/activities", base),
            };
            let res = authed(client.get(url)).send().await?;
            print_response(res).await?;
        }
        Commands::Users => {
            let res = authed(client.get(format!("{}/users", base))).send().await?;
            print_response(res).await?;
        }
        Commands::SmtpList => {
            let res = authed(client.get(format!("{}/smtp", base))).send().await?;
            print_response(res).await?;
        }
        Commands::SmtpImport { file } => {
            let text = fs::read_to_string(&file)?;
            let res = authed(client.post(format!("{}/smtp/import", base)))
                .json(&json!({ "text": text }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::DraftSave { to, subject, body, html } => {
            let res = authed(client.post(format!("{}/drafts", base)))
                .json(&json!({ "to": to, "subject": subject, "body": body, "isHtml": html }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::DraftList => {
            let res = authed(client.get(format!("{}/drafts", base))).send().await?;
            print_response(res).await?;
        }
        Commands::DraftDelete { subject } => {
            let mut url = Url::parse(&base)?;
            url.path_segments_mut()
                .map_err(|_| "base URL cannot carry a path")?
                .pop_if_empty()
                .extend(["drafts", subject.as_str()]);
            let res = authed(client.delete(url)).send().await?;
            print_response(res).await?;
        }
        Commands::Send { to, subject, body, html } => {
            let res = authed(client.post(format!("{}/send", base)))
                .json(&json!({ "to": to, "subject": subject, "body": body, "isHtml": html }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::CampaignEmail { name, subject, body, recipients, smtp_id, schedule_at } => {
            let res = authed(client.post(format!("{}/campaigns/email", base)))
                .json(&json!({
                    "campaignName": name,
                    "subject": subject,
                    "body": body,
                    "recipients": recipients,
                    "smtpId": smtp_id,
                    "scheduleAt": schedule_at,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::CampaignSms { name, message, recipients, sender_id, gateway, schedule_at } => {
            let res = authed(client.post(format!("{}/campaigns/sms", base)))
                .json(&json!({
                    "campaignName": name,
                    "message": message,
                    "recipients": recipients,
                    "senderId": sender_id,
                    "gateway": gateway,
                    "scheduleAt": schedule_at,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Campaigns => {
            let res = authed(client.get(format!("{}/campaigns", base))).send().await?;
            print_response(res).await?;
        }
        Commands::Suggest { prompt } => {
            let res = authed(client.post(format!("{}/ai/suggest", base)))
                .json(&json!({ "prompt": prompt }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Agents => {
            let res = authed(client.get(format!("{}/agents", base))).send().await?;
            print_response(res).await?;
        }
        Commands::AgentSend { agent, to, subject, body } => {
            // Opening the agent first logs the selection like the composer does
            authed(client.get(format!("{}/agents/{}", base, agent))).send().await?;
            let res = authed(client.post(format!("{}/agents/{}/send", base, agent)))
                .json(&json!({ "to": to, "subject": subject, "body": body }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::SupportHistory => {
            let res = authed(client.get(format!("{}/support/messages", base))).send().await?;
            print_response(res).await?;
        }
        Commands::SupportAsk { text } => {
            let res = authed(client.post(format!("{}/support/messages", base)))
                .json(&json!({ "text": text }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}
