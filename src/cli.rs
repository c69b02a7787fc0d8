use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use crate::reddit::{SortOption, TimeFilter};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "reddit-lens",
    version,
    about = "Browse Reddit's public listings and comment threads from the terminal"
)]
pub struct Args {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output width in columns (defaults to the terminal width)
    #[arg(long, global = true)]
    pub width: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List posts from a subreddit
    Posts {
        #[arg(short, long)]
        subreddit: Option<String>,

        #[arg(long, default_value_t = SortOption::Hot)]
        sort: SortOption,

        /// Time window for `top`
        #[arg(long)]
        time: Option<TimeFilter>,

        #[arg(long, default_value_t = crate::endpoints::DEFAULT_LIMIT)]
        limit: u32,

        /// Pagination cursor from a previous page
        #[arg(long)]
        after: Option<String>,

        /// Shared link whose `?subreddit=` selects the listing
        #[arg(long)]
        link: Option<Url>,
    },
    /// Search posts across Reddit
    Search {
        #[arg(required = true, num_args = 1..)]
        term: Vec<String>,
    },
    /// Show a post and its comment tree
    Comments { subreddit: String, post_id: String },
}
