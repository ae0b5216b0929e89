use anyhow::Result;
use clap::{Parser, Subcommand};

mod api;
mod config;
mod error;
mod logger;
mod models;
mod mutation;
mod ordering;
mod prefs;
mod prompt;
mod session;
#[cfg(test)]
mod testing;
mod unlock;
mod views;

use crate::api::APIClient;
use crate::config::PreferenceBackend;
use crate::models::{display_time, NotebookKey};
use crate::mutation::NotebookEditForm;
use crate::ordering::{SortDirection, FIELD_CREATE_TIME, FIELD_DESCRIPTION, FIELD_EDIT_TIME, FIELD_NAME};
use crate::prefs::{Preferences, SettingsRepo};
use crate::prompt::{TerminalPrompter, TerminalReporter};
use crate::views::{render_entries, render_notebook_header, render_notebooks, App, SortOverride};

#[derive(Parser)]
#[command(version, about = "Client for an encrypted notebook store", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Default)]
struct SortArgs {
    /// Field to sort by
    #[arg(long, value_parser = [FIELD_NAME, FIELD_DESCRIPTION, FIELD_CREATE_TIME, FIELD_EDIT_TIME])]
    sort: Option<String>,
    /// asc, desc or none
    #[arg(long)]
    order: Option<SortDirection>,
}

impl From<SortArgs> for SortOverride {
    fn from(args: SortArgs) -> Self {
        SortOverride {
            field: args.sort,
            direction: args.order,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List notebooks (default)
    List {
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Create a notebook; the key is asked for twice
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Unlock a notebook and list its entries
    Open {
        notebook: String,
        #[arg(long)]
        key: Option<String>,
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Open an entry in the line editor
    Entry {
        notebook: String,
        entry: String,
        #[arg(long)]
        key: Option<String>,
    },
    /// Search a notebook's entries
    Search {
        notebook: String,
        #[arg(default_value = "")]
        query: String,
        /// Treat the query as a regular expression
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        key: Option<String>,
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Rename, re-describe or re-key a notebook
    Edit {
        notebook: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Ask for the old and new keys
        #[arg(long)]
        change_key: bool,
        #[arg(long)]
        key: Option<String>,
    },
    /// Add an empty entry to a notebook
    NewEntry {
        notebook: String,
        entry: String,
        #[arg(long)]
        key: Option<String>,
    },
    RenameEntry {
        notebook: String,
        entry: String,
        new_name: String,
        #[arg(long)]
        key: Option<String>,
    },
    DeleteEntry {
        notebook: String,
        entry: String,
        #[arg(long)]
        key: Option<String>,
    },
    /// Delete a notebook and everything in it
    Delete {
        notebook: String,
        #[arg(long)]
        key: Option<String>,
    },
}

fn carried(key: Option<String>) -> Option<NotebookKey> {
    key.filter(|k| !k.is_empty()).map(NotebookKey::new)
}

type Cli<'a> = App<'a, APIClient, TerminalPrompter, Preferences<'a>, TerminalReporter>;

async fn run(app: &Cli<'_>, terminal: &TerminalPrompter, command: Commands) -> Result<()> {
    match command {
        Commands::List { sort } => {
            if let Some(view) = app.home(&sort.into()).await {
                print!("{}", render_notebooks(&view));
            }
        }
        Commands::Create { name, description } => {
            let Some(key) = terminal.read_secret("Key: ").await else {
                return Ok(());
            };
            let Some(confirm_key) = terminal.read_secret("Confirm key: ").await else {
                return Ok(());
            };
            if let Some(notebook) = app
                .create_notebook(&name, &description, &key, &confirm_key)
                .await
            {
                println!("Created notebook '{}'.", notebook.name);
            }
        }
        Commands::Open {
            notebook,
            key,
            sort,
        } => {
            if let Some(page) = app.notebook(&notebook, carried(key), &sort.into()).await {
                print!("{}", render_notebook_header(page.session.notebook()));
                print!("{}", render_entries(&page.entries));
            }
        }
        Commands::Entry {
            notebook,
            entry,
            key,
        } => {
            let Some(mut session) = app.entry(&notebook, &entry, carried(key)).await else {
                return Ok(());
            };
            let current = session.entry();
            println!(
                "{} / {} (created {}, edited {})",
                session.notebook_name(),
                current.name,
                display_time(&current.create_time),
                display_time(&current.edit_time)
            );
            println!("{}", session.buffer().as_str());
            println!("Type :help for editor commands.");
            app.edit_entry(&mut session, terminal).await;
        }
        Commands::Search {
            notebook,
            query,
            regex,
            key,
            sort,
        } => {
            if let Some(page) = app
                .search(&notebook, carried(key), &query, regex, &sort.into())
                .await
            {
                if page.query.is_empty() {
                    println!("No query given.");
                } else {
                    println!("Results for '{}' in {}:", page.query, page.session.name());
                    print!("{}", render_entries(&page.results));
                }
            }
        }
        Commands::Edit {
            notebook,
            name,
            description,
            change_key,
            key,
        } => {
            let mut form = NotebookEditForm {
                name: name.unwrap_or_default(),
                description,
                ..Default::default()
            };
            if change_key {
                form.old_key = terminal.read_secret("Old key: ").await.unwrap_or_default();
                form.new_key = terminal.read_secret("New key: ").await.unwrap_or_default();
                form.confirm_new_key = terminal
                    .read_secret("Confirm new key: ")
                    .await
                    .unwrap_or_default();
            }

            if let Some(edited) = app.edit_notebook(&notebook, carried(key), &form).await {
                if !edited.outcome.committed.is_empty() {
                    println!("Applied: {:?}", edited.outcome.committed);
                }
                match edited.reopened {
                    Some(session) => print!("{}", render_notebook_header(session.notebook())),
                    None => println!("Notebook is now '{}'.", edited.outcome.name),
                }
            }
        }
        Commands::NewEntry {
            notebook,
            entry,
            key,
        } => {
            if let Some(created) = app.create_entry(&notebook, carried(key), &entry).await {
                println!("Created entry '{}'.", created.name);
            }
        }
        Commands::RenameEntry {
            notebook,
            entry,
            new_name,
            key,
        } => {
            if let Some(renamed) = app
                .rename_entry(&notebook, carried(key), &entry, &new_name)
                .await
            {
                println!("Renamed '{}' to '{}'.", entry, renamed.name);
            }
        }
        Commands::DeleteEntry {
            notebook,
            entry,
            key,
        } => {
            if app.delete_entry(&notebook, carried(key), &entry).await {
                println!("Deleted entry '{}'.", entry);
            }
        }
        Commands::Delete { notebook, key } => {
            if app.delete_notebook(&notebook, carried(key)).await {
                println!("Deleted notebook '{}'.", notebook);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logger::init() {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let args = Args::parse();
    let app_config = config::load_config();
    let client = APIClient::new(&app_config)?;
    let prefs = match app_config.general.preferences {
        PreferenceBackend::Local => Preferences::Local(SettingsRepo::new()?),
        PreferenceBackend::Remote => Preferences::Remote(&client),
    };

    let terminal = TerminalPrompter;
    let reporter = TerminalReporter;
    let app = App::new(&client, &terminal, &prefs, &reporter);

    let command = args.command.unwrap_or(Commands::List {
        sort: SortArgs::default(),
    });
    run(&app, &terminal, command).await
}
