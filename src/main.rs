use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use tracing_subscriber::EnvFilter;

use threadline::api::HttpBackend;
use threadline::config::{Cli, Command, Config, Target};
use threadline::model::{BearerToken, MediaId, PostId, PostStatus, Session, UserId};
use threadline::sync::Scope;
use threadline::view::{ThreadNode, Visibility};
use threadline::{CommentEngine, Created, Outcome};

type Engine = CommentEngine<HttpBackend>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging. Output goes to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    tracing::info!("Backend: {}", config.backend.base_url);

    let backend = HttpBackend::new(&config.backend.base_url, config.timeout())?;
    let engine = CommentEngine::new(Arc::new(backend), config.engine_config());

    let session = match cli.token {
        Some(ref token) => engine
            .sign_in(BearerToken::new(token.clone()))
            .await
            .context("Sign-in failed")?,
        None => Session::anonymous(),
    };

    run(&engine, &session, cli.command).await
}

async fn run(engine: &Engine, session: &Session, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Show { media, depth, all } => {
            let media = MediaId::new(media);
            expand(engine, session, &media, depth).await?;
            let visibility = if all {
                Visibility::Moderation
            } else {
                Visibility::Feed
            };
            let threads = engine.thread_view(&media, visibility);
            if threads.is_empty() {
                println!("No comments on {}", media);
            }
            for node in &threads {
                print_node(node, 0);
            }
        }
        Command::Post { media, content } => {
            let created = engine
                .post_comment(session, &MediaId::new(media), &content)
                .await?;
            print_created(&created);
        }
        Command::Reply { target, content } => {
            let parent = locate(engine, session, &target).await?;
            let created = engine.post_reply(session, &parent, &content).await?;
            print_created(&created);
        }
        Command::Vote { target, direction } => {
            let id = locate(engine, session, &target).await?;
            let outcome = engine.vote(session, &id, direction.into()).await?;
            if let Some(post) = engine.post(&id) {
                println!(
                    "{}: score {} (your vote {}){}",
                    id,
                    post.score,
                    post.user_vote.value(),
                    superseded_note(outcome)
                );
            }
        }
        Command::Edit { target, content } => {
            let id = locate(engine, session, &target).await?;
            let outcome = engine.edit(session, &id, &content).await?;
            println!("Edited {}{}", id, superseded_note(outcome));
        }
        Command::Delete { target } => {
            let id = locate(engine, session, &target).await?;
            let outcome = engine.delete(session, &id).await?;
            println!("Deleted {}{}", id, superseded_note(outcome));
        }
        Command::Report { target, reason } => {
            let id = locate(engine, session, &target).await?;
            engine.report(session, &id, &reason).await?;
            println!("Reported {}", id);
        }
        Command::Reports {
            limit,
            offset,
            search,
        } => {
            let mut reports = engine.load_reports(session, limit, offset).await?;
            if let Some(ref needle) = search {
                reports = engine.search_reports(needle);
            }
            if reports.is_empty() {
                println!("No open reports");
            }
            for report in reports {
                println!(
                    "{}  post {} by {} (reported by {}: {})",
                    report.id, report.post_id, report.post_author, report.reporter, report.reason
                );
                println!("    {}", report.post_content);
            }
        }
        Command::Status { post, status } => {
            let id = PostId::confirmed(post);
            engine.set_status(session, &id, status).await?;
            println!("{} is now {}", id, status);
        }
        Command::Ban { user } => {
            let user = UserId::new(user);
            engine.ban_user(session, &user).await?;
            println!("Banned {}", user);
        }
        Command::Whoami => match session.actor {
            Some(ref actor) => println!("{} ({:?})", actor.username, actor.role),
            None => println!("Not signed in"),
        },
    }
    Ok(())
}

/// Load the root comments, then `depth` levels of replies. Reply scopes on
/// the same level load concurrently.
async fn expand(
    engine: &Engine,
    session: &Session,
    media: &MediaId,
    depth: usize,
) -> anyhow::Result<()> {
    let mut level = engine
        .open_scope(session, &Scope::roots(media.clone()))
        .await?;

    for _ in 0..depth {
        let scopes: Vec<Scope> = level
            .iter()
            .filter_map(|id| engine.post(id))
            .filter(|post| post.reply_count > 0)
            .map(|post| Scope::replies_of(&post))
            .collect();
        if scopes.is_empty() {
            break;
        }

        let loaded = join_all(scopes.iter().map(|scope| engine.open_scope(session, scope))).await;
        level = Vec::new();
        for items in loaded {
            level.extend(items?);
        }
    }
    Ok(())
}

/// Page through the thread until the addressed post is in the store.
async fn locate(engine: &Engine, session: &Session, target: &Target) -> anyhow::Result<PostId> {
    let root = PostId::confirmed(target.root.as_str());
    let roots = Scope::roots(MediaId::new(target.media.as_str()));
    while engine.post(&root).is_none() {
        let page = engine.load_page(session, &roots).await?;
        if page.exhausted && engine.post(&root).is_none() {
            anyhow::bail!("Comment {} not found on {}", root, target.media);
        }
    }

    let Some(ref wanted) = target.post else {
        return Ok(root);
    };
    let wanted = PostId::confirmed(wanted.as_str());

    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        if engine.post(&wanted).is_some() {
            return Ok(wanted);
        }
        let Some(post) = engine.post(&id) else {
            continue;
        };
        if post.reply_count == 0 {
            continue;
        }
        let scope = Scope::replies_of(&post);
        loop {
            let page = engine.load_page(session, &scope).await?;
            if page.exhausted || engine.post(&wanted).is_some() {
                break;
            }
        }
        queue.extend(engine.scope_items(&scope));
    }

    if engine.post(&wanted).is_some() {
        return Ok(wanted);
    }
    anyhow::bail!("Reply {} not found in thread {}", wanted, target.root)
}

fn print_created(created: &Created) {
    match created {
        Created::Confirmed(id) => println!("Posted {}", id),
        Created::Cancelled => println!("Post was cancelled before it was confirmed"),
    }
}

fn superseded_note(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Applied => "",
        Outcome::Superseded => " (superseded by a newer local change)",
    }
}

fn print_node(node: &ThreadNode, indent: usize) {
    let post = &node.post;
    let pad = "  ".repeat(indent);
    let status = if post.status == PostStatus::Active {
        String::new()
    } else {
        format!(" [{}]", post.status)
    };
    println!(
        "{}{} {} ({:+}){}",
        pad, post.id, post.author.username, post.score, status
    );
    for line in post.content.lines() {
        println!("{}  {}", pad, line);
    }
    for reply in &node.replies {
        print_node(reply, indent + 1);
    }
    if node.has_more {
        println!("{}  ... more replies", pad);
    }
}
