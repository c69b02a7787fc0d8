use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use crossterm::queue;
use crossterm::style::{Attribute, Color as TermColor, ContentStyle, PrintStyledContent};
use log::info;
use ratatui::style::{Color, Modifier};
use ratatui::text::{Line, Span, Text};
use textwrap::{wrap, Options as WrapOptions};

use crate::cli::{Args, Command};
use crate::clock::SystemClock;
use crate::config::{self, Config, LoadOptions};
use crate::endpoints::GetPosts;
use crate::modal::{CommentsView, PostModal, TerminalEffects};
use crate::query::{QueryClient, QueryConfig, QueryOptions};
use crate::reddit::{self, Post};
use crate::render;
use crate::search::{SearchController, SearchStatus};
use crate::state::{validate_subreddit, UiState};

const DEFAULT_WIDTH: u16 = 100;
const MIN_WIDTH: u16 = 40;

pub fn run() -> Result<()> {
    run_with(Args::parse())
}

pub fn run_with(args: Args) -> Result<()> {
    let cfg = config::load(LoadOptions {
        config_file: args.config.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let mut out = Output::stdout(output_width(args.width));

    match args.command {
        Command::Posts {
            subreddit,
            sort,
            time,
            limit,
            after,
            link,
        } => {
            let mut state = UiState::new(cfg.ui.default_subreddit.clone());
            if let Some(link) = &link {
                state.apply_url(link);
            }
            if let Some(input) = subreddit.as_deref() {
                state.submit_subreddit(input)?;
            }
            state.set_sort_by(sort);
            if let Some(filter) = time {
                state.set_time_filter(filter);
            }

            let mut query = state.posts_query().limit(limit);
            if time.is_some() {
                query = query.time_filter(time);
            }
            if let Some(cursor) = after {
                query = query.after(cursor);
            }

            let engine = Engine::connect(&cfg)?;
            show_posts(&engine, &state, query, &mut out)?;

            if let Some(mut link) = link {
                state.write_url(&mut link);
                out.plain(&format!("share: {link}"))?;
            }
        }
        Command::Search { term } => {
            let engine = Engine::connect(&cfg)?;
            show_search(&engine, &cfg, term.join(" "), &mut out)?;
        }
        Command::Comments { subreddit, post_id } => {
            let subreddit = validate_subreddit(&subreddit)?
                .ok_or_else(|| anyhow!("subreddit name required"))?;
            if post_id.is_empty() || !post_id.chars().all(|c| c.is_ascii_alphanumeric()) {
                bail!("invalid post id {post_id:?}");
            }
            let engine = Engine::connect(&cfg)?;
            show_comments(&engine, subreddit, post_id, &mut out)?;
        }
    }

    Ok(())
}

struct Engine {
    client: QueryClient,
    wait: Duration,
}

impl Engine {
    fn connect(cfg: &Config) -> Result<Self> {
        let http = reddit::Client::new(cfg.reddit.client_config()).context("create reddit client")?;
        info!("reading from {}", http.base_url());
        let client = QueryClient::new(
            Arc::new(http),
            Arc::new(SystemClock),
            QueryConfig::from(&cfg.query),
        );
        Ok(Self {
            client,
            wait: cfg.reddit.timeout + Duration::from_secs(5),
        })
    }
}

fn show_posts(engine: &Engine, state: &UiState, query: GetPosts, out: &mut Output) -> Result<()> {
    let subscription = engine.client.subscribe(query, QueryOptions::default());
    let result = subscription.settle(engine.wait);

    if let Some(err) = result.error {
        let message = render::posts_error_message(&err);
        return Err(anyhow::Error::new(err).context(message));
    }
    let Some(listing) = result.data else {
        bail!("timed out waiting for posts");
    };
    if listing.is_empty() {
        return out.plain(&render::no_posts_message(state.selected_subreddit()));
    }

    out.text(&render::posts_text(
        &listing.children,
        out.width(),
        Utc::now().timestamp(),
    ))?;
    out.plain(&format!(
        "Showing {} posts from r/{}",
        listing.len(),
        state.selected_subreddit()
    ))?;
    if let Some(cursor) = &listing.after {
        out.plain(&format!("next page: --after {cursor}"))?;
    }
    Ok(())
}

fn show_search(engine: &Engine, cfg: &Config, input: String, out: &mut Output) -> Result<()> {
    let mut search = SearchController::new(
        &engine.client,
        Arc::new(SystemClock),
        cfg.search.debounce,
        cfg.search.min_chars,
    );
    search.set_input(input);
    if let SearchStatus::NeedsMoreCharacters { min } = search.status() {
        return Err(crate::error::ValidationError::SearchTooShort { min }.into());
    }
    if let Some(deadline) = search.deadline() {
        thread::sleep(deadline.saturating_duration_since(Instant::now()));
    }
    search.tick();

    let result = search.subscription().settle(engine.wait);
    if let Some(err) = result.error {
        let message = render::posts_error_message(&err);
        return Err(anyhow::Error::new(err).context(message));
    }
    let Some(listing) = result.data else {
        bail!("timed out waiting for search results");
    };
    if listing.is_empty() {
        return out.plain(&render::no_results_message(search.term()));
    }
    out.plain(&format!("{} results found", listing.len()))?;
    out.text(&render::posts_text(
        &listing.children,
        out.width(),
        Utc::now().timestamp(),
    ))
}

fn show_comments(engine: &Engine, subreddit: String, post_id: String, out: &mut Output) -> Result<()> {
    let stub = Post {
        id: post_id,
        subreddit,
        ..Post::default()
    };
    let mut modal = PostModal::new(&engine.client, stub, Box::new(TerminalEffects));
    modal.open();
    let result = modal.comments().settle(engine.wait);
    let now = Utc::now().timestamp();

    if let Some(thread) = &result.data {
        out.text(&post_header(&thread.post, out.width(), now))?;
    }
    let outcome = match modal.comments_view(now) {
        CommentsView::Loaded(thread) => out.text(&render::thread_text(&thread, out.width())),
        CommentsView::Failed { message, error } => Err(anyhow::Error::new(error).context(message)),
        CommentsView::Loading | CommentsView::Hidden => Err(anyhow!("timed out waiting for comments")),
    };
    modal.close();
    outcome
}

fn post_header(post: &Post, width: usize, now: i64) -> Text<'static> {
    let title = ratatui::style::Style::default().add_modifier(Modifier::BOLD);
    let meta = ratatui::style::Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line<'static>> = wrap(&post.title, WrapOptions::new(width))
        .into_iter()
        .map(|segment| Line::from(Span::styled(segment.into_owned(), title)))
        .collect();
    lines.push(Line::from(Span::styled(render::post_meta_line(post, now), meta)));
    if !post.is_self && !post.url.is_empty() {
        lines.push(Line::from(Span::styled(
            post.url.clone(),
            ratatui::style::Style::default().fg(Color::Blue),
        )));
    }
    if let Some(body) = post.self_text() {
        lines.push(Line::default());
        for paragraph in body.split('\n') {
            if paragraph.is_empty() {
                lines.push(Line::default());
                continue;
            }
            lines.extend(
                wrap(paragraph, WrapOptions::new(width))
                    .into_iter()
                    .map(|segment| Line::from(Span::raw(segment.into_owned()))),
            );
        }
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        format!("{} Comments", post.num_comments),
        title,
    )));
    Text::from(lines)
}

fn output_width(requested: Option<u16>) -> usize {
    let width = requested
        .or_else(|| crossterm::terminal::size().ok().map(|(cols, _)| cols))
        .unwrap_or(DEFAULT_WIDTH);
    usize::from(width.max(MIN_WIDTH))
}

struct Output {
    out: io::Stdout,
    color: bool,
    width: usize,
}

impl Output {
    fn stdout(width: usize) -> Self {
        let out = io::stdout();
        let color = out.is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self { out, color, width }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn plain(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}").context("write output")
    }

    fn text(&mut self, text: &Text<'_>) -> Result<()> {
        let mut out = self.out.lock();
        for line in &text.lines {
            for span in &line.spans {
                if self.color {
                    let style = content_style(span.style);
                    queue!(out, PrintStyledContent(style.apply(span.content.as_ref())))
                        .context("write output")?;
                } else {
                    out.write_all(span.content.as_bytes())
                        .context("write output")?;
                }
            }
            out.write_all(b"\n").context("write output")?;
        }
        out.flush().context("flush output")
    }
}

fn content_style(style: ratatui::style::Style) -> ContentStyle {
    let mut content = ContentStyle::new();
    content.foreground_color = style.fg.and_then(term_color);
    content.background_color = style.bg.and_then(term_color);
    if style.add_modifier.contains(Modifier::BOLD) {
        content.attributes.set(Attribute::Bold);
    }
    if style.add_modifier.contains(Modifier::UNDERLINED) {
        content.attributes.set(Attribute::Underlined);
    }
    content
}

fn term_color(color: Color) -> Option<TermColor> {
    let mapped = match color {
        Color::Reset => return None,
        Color::Black => TermColor::Black,
        Color::Red => TermColor::DarkRed,
        Color::Green => TermColor::DarkGreen,
        Color::Yellow => TermColor::DarkYellow,
        Color::Blue => TermColor::DarkBlue,
        Color::Magenta => TermColor::DarkMagenta,
        Color::Cyan => TermColor::DarkCyan,
        Color::Gray => TermColor::Grey,
        Color::DarkGray => TermColor::DarkGrey,
        Color::LightRed => TermColor::Red,
        Color::LightGreen => TermColor::Green,
        Color::LightYellow => TermColor::Yellow,
        Color::LightBlue => TermColor::Blue,
        Color::LightMagenta => TermColor::Magenta,
        Color::LightCyan => TermColor::Cyan,
        Color::White => TermColor::White,
        Color::Rgb(r, g, b) => TermColor::Rgb { r, g, b },
        Color::Indexed(value) => TermColor::AnsiValue(value),
    };
    Some(mapped)
}
