//! Command handlers.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use filmlog_content::{
    DocumentCorpus, LiveCollection, NewPost, PostEdit, SnapshotCallback, WorkLog,
};
use filmlog_core::{EntryRef, ImagePayload, InquiryId, LiveEntry, PostId, PrincipalId};
use filmlog_session::SessionState;
use filmlog_store::{filter_inquiries, Inquiry, InquiryFilter, NewInquiry};
use filmlog_telemetry::{IncidentQuery, OperatorLog};
use tokio::sync::mpsc;
use tracing::{info, warn, Span};

use crate::app::App;
use crate::cli::{Command, InquiryCommand, LogsArgs, PostCommand, SubmitArgs};

const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Log { search, json } => log(app, search, json).await,
        Command::Show { slug } => show(app, &slug),
        Command::Watch { search } => watch(app, search).await,
        Command::Post(cmd) => post(app, cmd).await,
        Command::Login { as_principal } => login(app, as_principal.map(PrincipalId::from_raw)).await,
        Command::Logout => logout(app).await,
        Command::Whoami => whoami(app).await,
        Command::Inquiry(cmd) => inquiry(app, cmd).await,
        Command::Logs(args) => logs(app, args),
    }
}

fn snapshot_channel() -> (SnapshotCallback, mpsc::UnboundedReceiver<Vec<LiveEntry>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: SnapshotCallback = Box::new(move |posts| {
        let _ = tx.send(posts);
    });
    (callback, rx)
}

/// The author's posts as of now. Empty when the live source is unavailable.
async fn live_snapshot(app: &App) -> Vec<LiveEntry> {
    let (Some(live), Some(author)) = (app.live(), app.author()) else {
        warn!("live posts unavailable, showing documents only");
        return Vec::new();
    };
    let (callback, mut rx) = snapshot_channel();
    let _subscription = live.subscribe(&author, callback);
    match tokio::time::timeout(FIRST_SNAPSHOT_TIMEOUT, rx.recv()).await {
        Ok(Some(posts)) => posts,
        Ok(None) | Err(_) => {
            warn!("no live snapshot received, showing documents only");
            Vec::new()
        }
    }
}

async fn log(app: &App, search: Option<String>, json: bool) -> anyhow::Result<()> {
    let mut work_log = WorkLog::new(app.corpus().list());
    work_log.replace_live(live_snapshot(app).await);
    if let Some(search) = search {
        work_log.set_search(search);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(work_log.view())?);
    } else {
        render(&work_log);
    }
    Ok(())
}

fn render(work_log: &WorkLog) {
    let merged = work_log.merged();
    if merged.is_empty() {
        if work_log.search().trim().is_empty() {
            println!("No entries yet.");
        } else {
            println!("No entries match \"{}\".", work_log.search().trim());
        }
        return;
    }
    for entry in merged {
        println!("{}", format_entry(&entry));
    }
}

fn format_entry(entry: &EntryRef<'_>) -> String {
    let date = filmlog_core::time::parse_timestamp(entry.created_at())
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let body = entry.display_body().lines().next().unwrap_or_default();
    if body.is_empty() {
        format!("{date}  [{}] {}  ({})", entry.source(), entry.title(), entry.id())
    } else {
        format!("{date}  [{}] {}  ({})\n            {body}", entry.source(), entry.title(), entry.id())
    }
}

fn show(app: &App, slug: &str) -> anyhow::Result<()> {
    let Some(doc) = app.corpus().get(slug) else {
        bail!("no document named {slug:?}");
    };
    println!("# {}", doc.title);
    println!("{}  {}", doc.created_at, app.document_url(&doc.slug));
    if let Some(summary) = &doc.summary {
        println!("\n{summary}");
    }
    println!("\n{}", doc.body.trim_end());
    Ok(())
}

async fn watch(app: &App, search: Option<String>) -> anyhow::Result<()> {
    let Some(live) = app.live() else {
        bail!("database is unavailable; nothing to watch");
    };
    let Some(author) = app.author() else {
        bail!("site.authorId is not configured; nothing to watch");
    };

    let mut work_log = WorkLog::new(app.corpus().list());
    if let Some(search) = search {
        work_log.set_search(search);
    }
    let (callback, mut rx) = snapshot_channel();
    let subscription = live.subscribe(&author, callback);
    info!(author = %author, "watching work log");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for ctrl-c")?;
                break;
            }
            snapshot = rx.recv() => match snapshot {
                Some(posts) => {
                    work_log.replace_live(posts);
                    println!("--- {} entries ---", work_log.merged().len());
                    render(&work_log);
                }
                None => break,
            },
        }
    }
    subscription.unsubscribe().await;
    Ok(())
}

/// Turn a CLI image argument into a payload: data URLs and stored URLs pass
/// through, anything else is read as a file.
fn image_payload(raw: &str) -> anyhow::Result<ImagePayload> {
    let raw = raw.trim();
    if raw.starts_with("data:") || raw.starts_with("http://") || raw.starts_with("https://") {
        return ImagePayload::parse(raw).context("empty image argument");
    }
    let path = Path::new(raw);
    let bytes = std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "gif" => "image/gif",
        _ => "image/png",
    };
    Ok(ImagePayload::Inline(format!("data:{mime};base64,{}", STANDARD.encode(bytes))))
}

fn image_payloads(raw: &[String]) -> anyhow::Result<Vec<ImagePayload>> {
    raw.iter().map(|r| image_payload(r)).collect()
}

async fn post(app: &App, cmd: PostCommand) -> anyhow::Result<()> {
    let author = app.require_author().await?;
    let posts = app.posts()?;

    match cmd {
        PostCommand::Create {
            title,
            content,
            images,
        } => {
            let post = NewPost {
                title,
                content,
                images: image_payloads(&images)?,
            };
            let created = posts.create(&author, post).await?;
            println!(
                "created {} with {} image(s)  {}",
                created.id,
                created.image_urls.len(),
                app.log_url()
            );
        }
        PostCommand::Update {
            id,
            title,
            content,
            images,
            clear_images,
        } => {
            let images = if clear_images {
                Some(Vec::new())
            } else if images.is_empty() {
                None
            } else {
                Some(image_payloads(&images)?)
            };
            let edit = PostEdit {
                title,
                content,
                images,
            };
            let updated = posts.update(&author, &PostId::from_raw(id), edit).await?;
            println!("updated {}  {}", updated.id, app.log_url());
        }
        PostCommand::Delete { id } => {
            let id = PostId::from_raw(id);
            posts.delete(&author, &id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn login(app: &App, identity: Option<PrincipalId>) -> anyhow::Result<()> {
    let manager = app.session(identity.clone()).await?;
    let state = manager.state();
    if let Some(current) = state.principal() {
        if identity.as_ref().map_or(true, |wanted| wanted == &current.id) {
            println!("already signed in as {}", current.id);
            print_remaining(&state, manager.remaining());
            return Ok(());
        }
        manager.sign_out().await?;
    }
    let principal = manager.sign_in().await.context("signing in")?;
    Span::current().record("principal", principal.id.as_str());
    println!("signed in as {}", principal.id);
    print_remaining(&manager.state(), manager.remaining());
    Ok(())
}

async fn logout(app: &App) -> anyhow::Result<()> {
    let manager = app.session(None).await?;
    let was = manager.state();
    manager.sign_out().await.context("signing out")?;
    match was.principal() {
        Some(principal) => println!("signed out {}", principal.id),
        None => println!("not signed in"),
    }
    Ok(())
}

async fn whoami(app: &App) -> anyhow::Result<()> {
    let manager = app.session(None).await?;
    let state = manager.state();
    match state.principal() {
        Some(principal) => {
            let role = if app.author().as_ref() == Some(&principal.id) {
                "author"
            } else {
                "visitor"
            };
            println!("{} ({role})", principal.id);
        }
        None => println!("not signed in"),
    }
    print_remaining(&state, manager.remaining());
    Ok(())
}

fn print_remaining(state: &SessionState, remaining: Option<Duration>) {
    if let (Some(login_at), Some(remaining)) = (state.login_at_ms(), remaining) {
        let minutes = remaining.as_secs() / 60;
        println!("logged in at {login_at} ms, expires in {minutes} min");
    }
}

async fn inquiry(app: &App, cmd: InquiryCommand) -> anyhow::Result<()> {
    match cmd {
        InquiryCommand::Submit(args) => {
            let repo = app.inquiries()?;
            let inquiry = repo.submit(new_inquiry(args))?;
            println!("received inquiry {}", inquiry.id);
        }
        InquiryCommand::List {
            status,
            search,
            json,
        } => {
            app.require_author().await?;
            let rows = app.inquiries()?.list()?;
            let filter = InquiryFilter {
                status,
                query: search,
            };
            let matched = filter_inquiries(&rows, &filter);
            if json {
                println!("{}", serde_json::to_string_pretty(&matched)?);
            } else if matched.is_empty() {
                println!("No inquiries.");
            } else {
                for row in matched {
                    println!("{}", format_inquiry(row));
                }
            }
        }
        InquiryCommand::Status { id, status } => {
            app.require_author().await?;
            let id = InquiryId::from_raw(id);
            app.inquiries()?.set_status(&id, status)?;
            println!("{id} is now {status}");
        }
        InquiryCommand::Delete { id } => {
            app.require_author().await?;
            let id = InquiryId::from_raw(id);
            app.inquiries()?.delete(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn new_inquiry(args: SubmitArgs) -> NewInquiry {
    NewInquiry {
        name: args.name,
        phone: args.phone,
        kakao_id: args.kakao_id,
        message: args.message,
        budget: args.budget,
        space_type: args.space,
    }
}

fn format_inquiry(row: &Inquiry) -> String {
    let space = row.space_type.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
    format!(
        "{}  [{}] {} {} ({space})  {}\n    {}",
        row.created_at, row.status, row.name, row.phone, row.id, row.message
    )
}

fn logs(app: &App, args: LogsArgs) -> anyhow::Result<()> {
    if !app.settings().logging.operator_log {
        bail!("the operator log is disabled (logging.operatorLog)");
    }
    let path = app.operator_log_path();
    let log = OperatorLog::open(&path)
        .with_context(|| format!("opening operator log {}", path.display()))?;

    if let Some(days) = args.prune_days {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
        let pruned = log.prune_before(&cutoff.to_rfc3339())?;
        println!("pruned {pruned} incident(s) older than {days} day(s)");
    }

    let since = args
        .hours
        .map(|h| (chrono::Utc::now() - chrono::Duration::hours(i64::from(h))).to_rfc3339());
    let incidents = log.query(&IncidentQuery {
        min_severity: args.level,
        command: args.command,
        principal: args.principal,
        post_id: args.post_id,
        inquiry_id: args.inquiry_id,
        since,
        limit: Some(args.limit),
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&incidents)?);
        return Ok(());
    }
    if incidents.is_empty() {
        println!("No incidents.");
    }
    for incident in incidents {
        let tags = &incident.tags;
        let subject = tags
            .post_id
            .as_deref()
            .or(tags.inquiry_id.as_deref())
            .unwrap_or("-");
        println!(
            "{} {:5} {:8} {:12} {subject}  {}",
            incident.recorded_at,
            incident.severity,
            tags.command.as_deref().unwrap_or("-"),
            tags.principal.as_deref().unwrap_or("-"),
            incident.message,
        );
        if let Some(error) = &incident.error {
            println!("    {error}");
        }
    }
    Ok(())
}
