use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lokal", version, about = "Lokal CLI - café vouchers at the counter")]
struct Cli {
    /// Server URL
    #[arg(long, env = "LOKAL_URL", default_value = "http://localhost:8080")]
    server: String,

    /// Access token from `lokal login`
    #[arg(long, env = "LOKAL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Why a voucher is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Reason {
    Gift,
    Birthday,
    Discount,
}

impl Reason {
    fn as_str(self) -> &'static str {
        match self {
            Reason::Gift => "gift",
            Reason::Birthday => "birthday",
            Reason::Discount => "discount",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print an access token
    Login {
        email: String,
        #[arg(long, env = "LOKAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Redeem a voucher at the counter
    Redeem {
        /// Voucher code, e.g. LOKAL-GIFT-7KQ2ZX
        code: String,
    },
    /// Show a voucher without redeeming it
    Show { code: String },
    /// Issue a voucher to a member
    Issue {
        /// Profile user ID
        user_id: Uuid,
        #[arg(long, value_enum, default_value_t = Reason::Gift)]
        reason: Reason,
        #[arg(long)]
        description: Option<String>,
        /// Days until expiry; server default when omitted
        #[arg(long)]
        valid_days: Option<i64>,
    },
    /// Run the birthday sweep
    BirthdayBatch {
        /// Day to run for (YYYY-MM-DD); today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List your own vouchers
    Mine,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let api = Api {
        client: Client::new(),
        server: cli.server.trim_end_matches('/').to_string(),
        token: cli.token,
    };

    match cli.command {
        Commands::Login { email, password } => cmd_login(&api, &email, &password).await?,
        Commands::Redeem { code } => cmd_redeem(&api, &code).await?,
        Commands::Show { code } => cmd_show(&api, &code).await?,
        Commands::Issue {
            user_id,
            reason,
            description,
            valid_days,
        } => {
            let body = json!({
                "userId": user_id,
                "reason": reason.as_str(),
                "description": description,
                "validDays": valid_days,
            });
            cmd_issue(&api, body).await?
        }
        Commands::BirthdayBatch { date } => cmd_birthday_batch(&api, date).await?,
        Commands::Mine => cmd_mine(&api).await?,
    }

    Ok(())
}

struct Api {
    client: Client,
    server: String,
    token: Option<String>,
}

impl Api {
    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.server, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.server, path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Send a request and return the JSON body, turning error responses into errors.
async fn send(request: RequestBuilder) -> Result<Value> {
    let resp = request
        .send()
        .await
        .context("Failed to connect to server")?;

    let status = resp.status();
    let body: Value = resp.json().await.context("Failed to parse response")?;

    if !status.is_success() {
        anyhow::bail!("Server returned {}: {}", status, error_message(&body));
    }
    Ok(body)
}

fn error_message(body: &Value) -> &str {
    body.get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error")
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("-")
}

async fn cmd_login(api: &Api, email: &str, password: &str) -> Result<()> {
    let body = send(
        api.post("/api/auth/login")
            .json(&json!({ "email": email, "password": password })),
    )
    .await?;

    let token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .context("Response did not contain an access token")?;

    println!("{}", token);
    Ok(())
}

async fn cmd_redeem(api: &Api, code: &str) -> Result<()> {
    let body = send(
        api.post("/api/vouchers/redeem")
            .json(&json!({ "voucherCode": code })),
    )
    .await?;

    println!("{}: {}", field(&body, "voucherCode"), field(&body, "message"));
    if let Some(voucher) = body.get("voucher") {
        print_voucher(voucher);
    }
    Ok(())
}

async fn cmd_show(api: &Api, code: &str) -> Result<()> {
    let body = send(api.get(&format!("/api/vouchers/{}", code))).await?;
    print_voucher(&body);
    Ok(())
}

async fn cmd_issue(api: &Api, request: Value) -> Result<()> {
    let body = send(api.post("/api/vouchers").json(&request)).await?;
    println!("Voucher issued: {}", field(&body, "code"));
    print_voucher(&body);
    Ok(())
}

async fn cmd_birthday_batch(api: &Api, date: Option<NaiveDate>) -> Result<()> {
    let body = send(
        api.post("/api/vouchers/birthday-batch")
            .json(&json!({ "date": date })),
    )
    .await?;

    let count = |key: &str| body.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    println!("Birthday batch for {}", field(&body, "date"));
    println!("  Matched: {}", count("matched"));
    println!("  Issued:  {}", count("issued"));
    println!("  Skipped: {}", count("skipped"));
    println!("  Failed:  {}", count("failed"));

    if let Some(codes) = body.get("codes").and_then(|v| v.as_array()) {
        for code in codes.iter().filter_map(|c| c.as_str()) {
            println!("  {}", code);
        }
    }
    Ok(())
}

async fn cmd_mine(api: &Api) -> Result<()> {
    let body = send(api.get("/api/vouchers/mine")).await?;
    let vouchers = body.as_array().context("Expected array response")?;

    if vouchers.is_empty() {
        println!("No vouchers found.");
        return Ok(());
    }

    println!("{:20} {:10} {:8} EXPIRES", "CODE", "REASON", "STATUS");
    println!("{}", "-".repeat(70));
    for voucher in vouchers {
        println!(
            "{:20} {:10} {:8} {}",
            field(voucher, "code"),
            field(voucher, "reason"),
            field(voucher, "status"),
            voucher
                .get("expiresAt")
                .and_then(|v| v.as_str())
                .unwrap_or("never"),
        );
    }
    Ok(())
}

fn print_voucher(voucher: &Value) {
    println!("Code:     {}", field(voucher, "code"));
    println!("Reason:   {}", field(voucher, "reason"));
    println!("Status:   {}", field(voucher, "status"));
    if let Some(description) = voucher.get("description").and_then(|v| v.as_str()) {
        println!("Note:     {}", description);
    }
    println!("Created:  {}", field(voucher, "createdAt"));
    println!(
        "Expires:  {}",
        voucher
            .get("expiresAt")
            .and_then(|v| v.as_str())
            .unwrap_or("never")
    );
    if let Some(used_at) = voucher.get("usedAt").and_then(|v| v.as_str()) {
        println!("Used:     {}", used_at);
    }
}
