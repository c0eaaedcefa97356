//! Command handlers.

use std::io::Write;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt, BufReader};

use bookchat_auth::{AuthClient, RegisterRequest};
use bookchat_chat::{ChatSession, ExchangeUpdate, FinishReason};
use bookchat_client::Book;
use bookchat_core::{BookId, QaPair};

use crate::{Command, Context};

/// Run one command to completion.
pub async fn run(ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => login(ctx, &email, password).await,
        Command::Register {
            email,
            username,
            full_name,
            password,
        } => {
            let password = password_or_prompt(password).await?;
            register(
                ctx,
                RegisterRequest {
                    email,
                    username,
                    password,
                    full_name,
                },
            )
            .await
        }
        Command::Logout => {
            auth_client(ctx).logout()?;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => whoami(ctx).await,
        Command::Books => books(ctx).await,
        Command::History { book } => {
            let chat = chat_session(ctx, &book)?;
            print_history(&chat.load_history().await?);
            Ok(())
        }
        Command::Clear { book } => {
            let chat = chat_session(ctx, &book)?;
            chat.clear_history().await?;
            println!("History cleared.");
            Ok(())
        }
        Command::Ask { book, question } => {
            let chat = chat_session(ctx, &book)?;
            ask(&chat, &question).await
        }
        Command::Chat { book } => interactive(ctx, &book).await,
    }
}

fn auth_client(ctx: &Context) -> AuthClient {
    AuthClient::new(ctx.auth_config.clone(), ctx.api.session().clone())
}

fn chat_session(ctx: &Context, book: &str) -> anyhow::Result<ChatSession> {
    let book_id: BookId = book.parse().context("invalid book id")?;
    Ok(ChatSession::connect(book_id, ctx.chat_config.clone(), &ctx.api)?)
}

async fn login(ctx: &Context, email: &str, password: Option<String>) -> anyhow::Result<()> {
    let password = password_or_prompt(password).await?;
    auth_client(ctx).login(email, &password).await?;

    // The tokens are fresh, so a failed lookup must not discard them.
    match ctx.api.fetch_user().await {
        Ok(user) => println!("Logged in as {}.", display_name(&user)),
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch the account after login");
            println!("Logged in. Account details are unavailable: {e}");
        }
    }
    Ok(())
}

async fn register(ctx: &Context, request: RegisterRequest) -> anyhow::Result<()> {
    auth_client(ctx).register(&request).await?;
    println!(
        "Account created for {}. Run `bookchat login {}` to sign in.",
        request.username, request.email
    );
    Ok(())
}

async fn whoami(ctx: &Context) -> anyhow::Result<()> {
    if !ctx.api.session().is_logged_in() {
        println!("Not logged in.");
        return Ok(());
    }
    let user = ctx.api.current_user().await?;
    println!("{} <{}>", display_name(&user), user.email);
    Ok(())
}

async fn books(ctx: &Context) -> anyhow::Result<()> {
    let books = ctx.api.list_books().await?;
    if books.is_empty() {
        println!("No books available.");
        return Ok(());
    }
    for book in &books {
        println!("{}", format_book(book));
    }
    Ok(())
}

/// Ask one question, echoing each revealed character as it arrives.
async fn ask(chat: &ChatSession, question: &str) -> anyhow::Result<()> {
    let mut exchange = chat.ask(question)?;
    let mut stdout = std::io::stdout();
    let mut shown = 0;

    while let Some(update) = exchange.next_update().await {
        if let ExchangeUpdate::Partial(text) = update {
            // Each partial extends the previous one.
            let fresh = text.get(shown..).unwrap_or_default();
            write!(stdout, "{fresh}")?;
            stdout.flush()?;
            shown = text.len();
        }
    }
    writeln!(stdout)?;

    let outcome = exchange.finish().await?;
    if outcome.reason != FinishReason::Completed {
        tracing::debug!(reason = ?outcome.reason, "Answer ended early");
    }
    Ok(())
}

async fn interactive(ctx: &Context, book: &str) -> anyhow::Result<()> {
    let chat = chat_session(ctx, book)?;
    match chat.load_history().await {
        Ok(pairs) if !pairs.is_empty() => {
            println!("{} earlier question(s). Type /history to show them.", pairs.len());
        }
        Ok(_) => {}
        // History is optional for chatting.
        Err(e) => tracing::warn!(error = %e, "Failed to load chat history"),
    }
    println!("Ask about {book}. Commands: /history, /clear, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/history" => print_history(&chat.history()),
            "/clear" => match chat.clear_history().await {
                Ok(()) => println!("History cleared."),
                Err(e) => eprintln!("Could not clear history: {e}"),
            },
            question => ask(&chat, question).await?,
        }
    }
    Ok(())
}

async fn password_or_prompt(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await?
        .context("no password given")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn display_name(user: &bookchat_client::User) -> &str {
    user.full_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&user.username)
}

fn format_book(book: &Book) -> String {
    let mut line = format!("{}  {}", book.id, book.title);
    if let Some(author) = book.author.as_deref().filter(|a| !a.is_empty()) {
        line.push_str(&format!(" by {author}"));
    }
    if let Some(progress) = book.progress {
        line.push_str(&format!(" ({progress:.0}%)"));
    }
    line
}

fn print_history(pairs: &[QaPair]) {
    if pairs.is_empty() {
        println!("No questions yet.");
        return;
    }
    for pair in pairs {
        println!("Q: {}", pair.question);
        println!("A: {}", pair.answer);
        println!();
    }
}
