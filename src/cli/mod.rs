//! CLI module: line-oriented shell and command parser

pub mod formatting;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::AppConfig;
use crate::persistence::{DuckDbStore, KeyValueStore};
use crate::service::ContactService;
use crate::store::{ContactStore, StoreOptions};
use crate::sync::{
    start_sync_coordinator, CloudSource, DeviceSource, MockAddressBook, MockCloudDirectory,
    SyncCoordinatorConfig, Synchronizer,
};
use crate::types::{
    ContactDraft, ContactPatch, EmailAddress, EventSource, HistoryEvent, InteractionKind,
    PhoneNumber,
};

/// Default window for `/recent`
pub const DEFAULT_RECENT_DAYS: i64 = 7;

/// Largest window `/recent` accepts (about a century)
pub const MAX_RECENT_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    ConfigShow,
    List,
    /// `key=value` pairs in input order
    Add(Vec<(String, String)>),
    Edit {
        id: String,
        fields: Vec<(String, String)>,
    },
    Log {
        id: String,
        kind: String,
        note: Option<String>,
    },
    Delete(String),
    ToggleFavorite(String),
    ToggleVip(String),
    Favorites,
    Groups,
    Recent(Option<i64>),
    Duplicates,
    Merge { primary: String, secondary: String },
    Flush,
    SyncStatus,
    SyncPush(String),
    SyncPull(String),
    Search(String),
    Empty,
}

pub fn parse_command(input: &str) -> Command {
    let line = input.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Command::Search(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let single_arg = |arg: Option<&str>, build: fn(String) -> Command| match arg {
        Some(id) => build(id.to_string()),
        None => Command::Help,
    };

    match cmd.as_str() {
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        "config" => match parts.next() {
            Some("show") => Command::ConfigShow,
            _ => Command::Help,
        },
        "list" | "ls" => Command::List,
        "add" => {
            let fields = parse_fields(&parts.collect::<Vec<_>>());
            if fields.is_empty() {
                Command::Help
            } else {
                Command::Add(fields)
            }
        }
        "edit" => match parts.next() {
            Some(id) => {
                let fields = parse_fields(&parts.collect::<Vec<_>>());
                if fields.is_empty() {
                    Command::Help
                } else {
                    Command::Edit {
                        id: id.to_string(),
                        fields,
                    }
                }
            }
            None => Command::Help,
        },
        "log" => match (parts.next(), parts.next()) {
            (Some(id), Some(kind)) => {
                let note = parts.collect::<Vec<_>>().join(" ");
                Command::Log {
                    id: id.to_string(),
                    kind: kind.to_lowercase(),
                    note: (!note.is_empty()).then_some(note),
                }
            }
            _ => Command::Help,
        },
        "delete" | "rm" => single_arg(parts.next(), Command::Delete),
        "fav" => single_arg(parts.next(), Command::ToggleFavorite),
        "vip" => single_arg(parts.next(), Command::ToggleVip),
        "favorites" | "favs" => Command::Favorites,
        "groups" => Command::Groups,
        "recent" => match parts.next() {
            None => Command::Recent(None),
            Some(days) => match days.parse::<i64>() {
                Ok(days) if (1..=MAX_RECENT_DAYS).contains(&days) => {
                    Command::Recent(Some(days))
                }
                _ => Command::Help,
            },
        },
        "duplicates" | "dups" => Command::Duplicates,
        "merge" => match (parts.next(), parts.next()) {
            (Some(primary), Some(secondary)) => Command::Merge {
                primary: primary.to_string(),
                secondary: secondary.to_string(),
            },
            _ => Command::Help,
        },
        "flush" => Command::Flush,
        "sync" => match (parts.next(), parts.next()) {
            (Some("status"), _) | (None, _) => Command::SyncStatus,
            (Some("push"), Some(source)) => Command::SyncPush(source.to_string()),
            (Some("pull"), Some(source)) => Command::SyncPull(source.to_string()),
            _ => Command::Help,
        },
        _ => Command::Help,
    }
}

/// `name=Jane Doe phone=555` → `[("name", "Jane Doe"), ("phone", "555")]`.
/// Tokens without `=` continue the previous value.
fn parse_fields(tokens: &[&str]) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                fields.push((key.to_lowercase(), value.to_string()));
            }
            _ => {
                if let Some((_, value)) = fields.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(token);
                }
            }
        }
    }
    fields
}

fn draft_from_fields(fields: &[(String, String)]) -> std::result::Result<ContactDraft, String> {
    let mut draft = ContactDraft::default();
    for (key, value) in fields {
        match key.as_str() {
            "name" => draft.name = Some(value.clone()),
            "first" => draft.first_name = Some(value.clone()),
            "last" => draft.last_name = Some(value.clone()),
            "phone" => {
                let phone = PhoneNumber::new(value.clone());
                let phone = if draft.phones.is_empty() {
                    phone.primary()
                } else {
                    phone
                };
                draft.phones.push(phone);
            }
            "email" => {
                let email = EmailAddress::new(value.clone());
                let email = if draft.emails.is_empty() {
                    email.primary()
                } else {
                    email
                };
                draft.emails.push(email);
            }
            "org" => draft.organization = Some(value.clone()),
            "title" => draft.title = Some(value.clone()),
            "group" => draft.group = Some(value.clone()),
            "notes" => draft.notes = Some(value.clone()),
            other => return Err(format!("Unknown field '{}'", other)),
        }
    }
    Ok(draft)
}

/// Listed fields replace the stored value; `phone` and `email` replace the whole list.
fn patch_from_fields(fields: &[(String, String)]) -> std::result::Result<ContactPatch, String> {
    let mut patch = ContactPatch::default();
    for (key, value) in fields {
        match key.as_str() {
            "name" => patch.name = Some(value.clone()),
            "first" => patch.first_name = Some(value.clone()),
            "last" => patch.last_name = Some(value.clone()),
            "phone" => {
                let phones = patch.phones.get_or_insert_with(Vec::new);
                let phone = PhoneNumber::new(value.clone());
                let phone = if phones.is_empty() { phone.primary() } else { phone };
                phones.push(phone);
            }
            "email" => {
                let emails = patch.emails.get_or_insert_with(Vec::new);
                let email = EmailAddress::new(value.clone());
                let email = if emails.is_empty() { email.primary() } else { email };
                emails.push(email);
            }
            "org" => patch.organization = Some(value.clone()),
            "title" => patch.title = Some(value.clone()),
            "group" => patch.group = Some(value.clone()),
            "notes" => patch.notes = Some(value.clone()),
            other => return Err(format!("Unknown field '{}'", other)),
        }
    }
    Ok(patch)
}

pub struct CliState {
    pub config: AppConfig,
    pub service: ContactService,
    db: DuckDbStore,
    coordinator: Option<JoinHandle<()>>,
}

impl CliState {
    /// Create a CLI state from a provided config
    pub async fn new_with_config(config: AppConfig) -> Result<Self> {
        let db = DuckDbStore::new(&config.store.path).context("initializing persistence")?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(db.clone());
        let store = ContactStore::open(Arc::clone(&kv), StoreOptions::from(&config.store)).await;

        let mut coordinator = None;
        let service = if config.sync.device_enabled || config.sync.cloud_enabled {
            let mut sync = Synchronizer::new(store.clone(), kv, config.sync.batch_size);
            if config.sync.device_enabled {
                sync.register(Arc::new(DeviceSource::new(
                    "device",
                    Arc::new(MockAddressBook::new()),
                )));
            }
            if config.sync.cloud_enabled {
                sync.register(Arc::new(CloudSource::new(
                    "cloud",
                    Arc::new(MockCloudDirectory::new()),
                )));
            }
            let sync = Arc::new(sync);
            coordinator = Some(start_sync_coordinator(
                Arc::clone(&sync),
                store.clone(),
                SyncCoordinatorConfig::from(&config.sync),
            ));
            ContactService::with_sync(store, sync)
        } else {
            ContactService::new(store)
        };

        Ok(Self {
            config,
            service,
            db,
            coordinator,
        })
    }

    /// Handle a single line of input. Returns an optional output string.
    pub async fn handle_line(&mut self, line: &str) -> Result<Option<String>> {
        let output = match parse_command(line) {
            Command::Empty => return Ok(None),
            Command::Help => formatting::render_help(),
            Command::Quit => "__QUIT__".to_string(),
            Command::ConfigShow => self.config.summary(),
            Command::List => formatting::render_contacts("Contacts", &self.service.list()),
            Command::Add(fields) => match draft_from_fields(&fields) {
                Ok(draft) => {
                    let record = self.service.add(draft)?;
                    format!("Added {} ({})", record.name, formatting::short_id(&record.id))
                }
                Err(message) => message,
            },
            Command::Edit { id: token, fields } => match self.resolve_id(&token) {
                Ok(id) => match patch_from_fields(&fields) {
                    Ok(patch) => match self.service.update(&id, patch) {
                        Some(record) => format!("Updated {}", record.name),
                        None => format!("No contact with id '{}'", token),
                    },
                    Err(message) => message,
                },
                Err(message) => message,
            },
            Command::Log {
                id: token,
                kind,
                note,
            } => match (self.resolve_id(&token), InteractionKind::parse(&kind)) {
                (Err(message), _) => message,
                (Ok(_), None) => format!(
                    "Unknown interaction '{}' (call, message, email, meeting, visit, custom)",
                    kind
                ),
                (Ok(id), Some(kind)) => {
                    let now = self.service.store().clock().now();
                    let mut event = HistoryEvent::new(kind, now, EventSource::Manual);
                    if let Some(note) = note {
                        event = event.with_note(note);
                    }
                    match self.service.append_history(&id, event) {
                        Some(record) => format!("Logged {} with {}", kind.as_str(), record.name),
                        None => format!("No contact with id '{}'", token),
                    }
                }
            },
            Command::Delete(token) => match self.resolve_id(&token) {
                Ok(id) => match self.service.delete(&id) {
                    Some(record) => format!("Deleted {}", record.name),
                    None => format!("No contact with id '{}'", token),
                },
                Err(message) => message,
            },
            Command::ToggleFavorite(token) => match self.resolve_id(&token) {
                Ok(id) => match self.service.toggle_favorite(&id) {
                    Some(record) if record.favorite => format!("{} is now a favorite", record.name),
                    Some(record) => format!("{} is no longer a favorite", record.name),
                    None => format!("No contact with id '{}'", token),
                },
                Err(message) => message,
            },
            Command::ToggleVip(token) => match self.resolve_id(&token) {
                Ok(id) => match self.service.toggle_vip(&id) {
                    Some(record) if record.vip => format!("{} is now a VIP", record.name),
                    Some(record) => format!("{} is no longer a VIP", record.name),
                    None => format!("No contact with id '{}'", token),
                },
                Err(message) => message,
            },
            Command::Favorites => {
                formatting::render_contacts("Favorites", &self.service.favorites())
            }
            Command::Groups => formatting::render_groups(&self.service.groups()),
            Command::Recent(days) => {
                let days = days.unwrap_or(DEFAULT_RECENT_DAYS);
                formatting::render_contacts(
                    &format!("Recent ({} days)", days),
                    &self.service.recent(days),
                )
            }
            Command::Duplicates => formatting::render_duplicates(&self.service.find_duplicates()),
            Command::Merge { primary, secondary } => {
                match (self.resolve_id(&primary), self.resolve_id(&secondary)) {
                    (Ok(primary), Ok(secondary)) => {
                        match self.service.merge_into(&primary, &secondary) {
                            Ok(record) => format!(
                                "Merged into {} ({})",
                                record.name,
                                formatting::short_id(&record.id)
                            ),
                            Err(e) => format!("Merge failed: {}", e),
                        }
                    }
                    (Err(message), _) | (_, Err(message)) => message,
                }
            }
            Command::Flush => {
                self.service.store().flush().await;
                "Pending changes written.".to_string()
            }
            Command::SyncStatus => formatting::render_sync_states(&self.service.sync_states()),
            Command::SyncPush(source) => match self.service.push_all(&source).await {
                Ok(result) => formatting::render_sync_result("Push to", &source, &result),
                Err(e) => format!("Push to {} failed: {}", source, e),
            },
            Command::SyncPull(source) => match self.service.pull_all(&source).await {
                Ok(result) => formatting::render_sync_result("Pull from", &source, &result),
                Err(e) => format!("Pull from {} failed: {}", source, e),
            },
            Command::Search(text) => {
                let needle = text.to_lowercase();
                let hits: Vec<_> = self
                    .service
                    .list()
                    .into_iter()
                    .filter(|c| c.name.to_lowercase().contains(&needle))
                    .collect();
                formatting::render_contacts(&format!("Matches for '{}'", text), &hits)
            }
        };
        Ok(Some(output))
    }

    /// Full id for an exact id or a unique prefix
    fn resolve_id(&self, token: &str) -> std::result::Result<String, String> {
        let contacts = self.service.list();
        if contacts.iter().any(|c| c.id == token) {
            return Ok(token.to_string());
        }
        let matches: Vec<&str> = contacts
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| id.starts_with(token))
            .collect();
        match matches.as_slice() {
            [only] => Ok(only.to_string()),
            [] => Err(format!("No contact with id '{}'", token)),
            _ => Err(format!("Id prefix '{}' is ambiguous", token)),
        }
    }

    pub async fn run_repl(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();
        let mut stdout = tokio::io::stdout();

        // Print welcome and summary
        stdout.write_all(self.config.summary().as_bytes()).await?;
        stdout.write_all(b"\nType /help for commands.\n").await?;
        stdout.flush().await?;

        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            } // EOF
            if let Some(out) = self.handle_line(&line).await? {
                if out == "__QUIT__" {
                    break;
                }
                stdout.write_all(out.as_bytes()).await?;
                if !out.ends_with('\n') {
                    stdout.write_all(b"\n").await?;
                }
                stdout.flush().await?;
            }
        }
        Ok(())
    }

    /// Stop background sync, let in-flight pushes finish, flush the store and
    /// checkpoint the database.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.coordinator.take() {
            handle.abort();
        }
        self.service.shutdown().await;
        if let Err(e) = self.db.checkpoint() {
            warn!("Checkpoint on shutdown failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoggingConfig, StoreConfig, SyncConfig};
    use tempfile::tempdir;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/config show"), Command::ConfigShow);
        assert_eq!(parse_command("/list"), Command::List);
        assert_eq!(parse_command("/delete abc"), Command::Delete("abc".into()));
        assert_eq!(parse_command("/delete"), Command::Help);
        assert_eq!(parse_command("/recent"), Command::Recent(None));
        assert_eq!(parse_command("/recent 30"), Command::Recent(Some(30)));
        assert_eq!(parse_command("/recent -1"), Command::Help);
        assert_eq!(parse_command("/recent 999999999999"), Command::Help);
        assert_eq!(
            parse_command(&format!("/recent {}", MAX_RECENT_DAYS)),
            Command::Recent(Some(MAX_RECENT_DAYS))
        );
        assert_eq!(
            parse_command("/log abc call left a voicemail"),
            Command::Log {
                id: "abc".into(),
                kind: "call".into(),
                note: Some("left a voicemail".into())
            }
        );
        assert_eq!(
            parse_command("/log abc Visit"),
            Command::Log {
                id: "abc".into(),
                kind: "visit".into(),
                note: None
            }
        );
        assert_eq!(parse_command("/log abc"), Command::Help);
        assert_eq!(parse_command("/edit abc"), Command::Help);
        assert_eq!(
            parse_command("/merge a b"),
            Command::Merge {
                primary: "a".into(),
                secondary: "b".into()
            }
        );
        assert_eq!(parse_command("/sync"), Command::SyncStatus);
        assert_eq!(parse_command("/sync push cloud"), Command::SyncPush("cloud".into()));
        assert_eq!(parse_command("jane"), Command::Search("jane".into()));
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn add_values_may_contain_spaces() {
        assert_eq!(
            parse_command("/add name=Jane Doe phone=555-1234 org=Acme Corp"),
            Command::Add(vec![
                ("name".into(), "Jane Doe".into()),
                ("phone".into(), "555-1234".into()),
                ("org".into(), "Acme Corp".into()),
            ])
        );
    }

    #[test]
    fn edit_fields_build_a_patch() {
        assert_eq!(
            parse_command("/edit abc org=Acme Corp phone=555"),
            Command::Edit {
                id: "abc".into(),
                fields: vec![("org".into(), "Acme Corp".into()), ("phone".into(), "555".into())],
            }
        );
        let patch = patch_from_fields(&[
            ("org".into(), "Acme Corp".into()),
            ("phone".into(), "555-1".into()),
            ("phone".into(), "555-2".into()),
        ])
        .unwrap();
        assert_eq!(patch.organization.as_deref(), Some("Acme Corp"));
        let phones = patch.phones.unwrap();
        assert_eq!(phones.len(), 2);
        assert!(phones[0].primary);
        assert!(!phones[1].primary);
        assert!(patch.name.is_none());

        let err = patch_from_fields(&[("color".into(), "blue".into())]).unwrap_err();
        assert_eq!(err, "Unknown field 'color'");
    }

    #[test]
    fn unknown_add_field_is_reported() {
        let err = draft_from_fields(&[("color".into(), "blue".into())]).unwrap_err();
        assert!(err.contains("color"));
    }

    fn test_config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            store: StoreConfig {
                path: dir.join("cli.duckdb"),
                debounce_ms: 10,
                history_retention: 20,
            },
            sync: SyncConfig::default(),
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_cli_smoke() {
        let dir = tempdir().unwrap();
        let mut cli = CliState::new_with_config(test_config(dir.path()))
            .await
            .unwrap();

        let out = cli
            .handle_line("/add name=Jane Doe phone=555-1234 email=jane@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(out.starts_with("Added Jane Doe"));
        cli.handle_line("/add name=J. Doe phone=(555) 1234 email=JANE@X.COM")
            .await
            .unwrap();

        let out = cli.handle_line("/duplicates").await.unwrap().unwrap();
        assert!(out.contains("Jane Doe"));
        assert!(out.contains("Matching phone numbers"));

        let ids: Vec<String> = cli.service.list().into_iter().map(|c| c.id).collect();
        let out = cli
            .handle_line(&format!("/merge {} {}", ids[0], ids[1]))
            .await
            .unwrap()
            .unwrap();
        assert!(out.starts_with("Merged into Jane Doe"));
        assert_eq!(cli.service.list().len(), 1);

        let out = cli.handle_line("/list").await.unwrap().unwrap();
        assert!(out.contains("Contacts (1)"));

        cli.shutdown().await;
    }

    #[tokio::test]
    async fn test_config_show_command() {
        let dir = tempdir().unwrap();
        let mut cli = CliState::new_with_config(test_config(dir.path()))
            .await
            .unwrap();

        let out = cli.handle_line("/config show").await.unwrap().unwrap();
        assert!(out.contains("Configuration loaded:"));
        assert!(out.contains("Write Debounce: 10ms"));
        assert!(out.contains("Logging Level: info"));
    }

    #[tokio::test]
    async fn test_help_command() {
        let dir = tempdir().unwrap();
        let mut cli = CliState::new_with_config(test_config(dir.path()))
            .await
            .unwrap();

        let out = cli.handle_line("/help").await.unwrap().unwrap();
        assert!(out.contains("Commands"));
        assert!(out.contains("/duplicates"));
        assert!(out.contains("/merge"));
        assert!(out.contains("/edit"));
        assert!(out.contains("/log"));
    }
}
