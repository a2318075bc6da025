use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Batch recommendation engine for the watch tracker
#[derive(Parser, Debug)]
#[command(name = "watch-recommender", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The requested command, `run` when none was given
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Run {
            dry_run: false,
            user: None,
        })
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Regenerate recommendations for every user (or one)
    Run {
        /// Score users without writing recommendations
        #[arg(long)]
        dry_run: bool,
        /// Only process this user
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// List users with similar taste
    Similar {
        user: Uuid,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a user's ranked recommendations without persisting them
    Recommend { user: Uuid },
    /// Print the recommendations currently stored for a user
    Show {
        user: Uuid,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["watch-recommender"]).unwrap();
        assert_eq!(
            cli.command(),
            Command::Run {
                dry_run: false,
                user: None
            }
        );
    }

    #[test]
    fn test_run_for_single_user_dry() {
        let id = Uuid::from_u128(7);
        let cli = Cli::try_parse_from([
            "watch-recommender",
            "run",
            "--dry-run",
            "--user",
            &id.to_string(),
        ])
        .unwrap();
        assert_eq!(
            cli.command(),
            Command::Run {
                dry_run: true,
                user: Some(id)
            }
        );
    }

    #[test]
    fn test_similar_limit() {
        let id = Uuid::from_u128(7);
        let cli = Cli::try_parse_from(["watch-recommender", "similar", &id.to_string(), "-l", "5"])
            .unwrap();
        assert_eq!(cli.command(), Command::Similar { user: id, limit: 5 });
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        assert!(Cli::try_parse_from(["watch-recommender", "recommend", "not-a-uuid"]).is_err());
    }
}
