use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tokio::task::{JoinHandle, LocalSet};

use devicesite::orchestrator::LocalTask;
use devicesite::{
    Credential, FieldKind, FieldStore, FormConfig, FormEvent, HttpTransport, Key, MemoryFieldStore,
    Navigator, Orchestrator, RecomputeClient, SelectorDomain, Spawner,
};

#[derive(Parser)]
#[command(name = "devicesite")]
#[command(about = "Headless driver for the diode calculation form")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Calculation service origin
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    url: String,

    /// TOML file overriding the form configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Anti-forgery token sent with every recompute
    #[arg(long, global = true, default_value = "")]
    token: String,

    /// Give up on a request after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log every request and response
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stepped selector options
    Domain,

    /// Print the constants of a device
    Constants {
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Replay form events against the service and print the final fields
    Session {
        #[arg(short, long)]
        device: Option<String>,

        /// JSON object of initial field values, e.g. '{"Vbi": "712.3"}'
        #[arg(long)]
        fields: Option<String>,

        /// Skip seeding fields from the constants endpoint
        #[arg(long)]
        no_constants: bool,

        /// `blur:<field>[=<value>]`, `key:<name>` or `change:<device>`, in order
        #[arg(short, long = "event")]
        events: Vec<String>,

        /// Fire all events without waiting for earlier recomputes
        #[arg(long)]
        concurrent: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_module("devicesite", level)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .init();

    let config = match &cli.config {
        Some(path) => FormConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => FormConfig::default(),
    };

    match &cli.command {
        Commands::Domain => {
            let domain = SelectorDomain::from_config(&config.selector);
            for option in domain.options() {
                println!("{}\t{}", option.value, option.label);
            }
            Ok(())
        }
        Commands::Constants { device } => {
            let device = device.clone().unwrap_or_else(|| config.default_device.clone());
            run_local(constants(&cli, config, device))
        }
        Commands::Session {
            device,
            fields,
            no_constants,
            events,
            concurrent,
        } => {
            let device = device.clone().unwrap_or_else(|| config.default_device.clone());
            let events = events
                .iter()
                .map(|spec| ScriptedEvent::parse(spec))
                .collect::<Result<Vec<_>>>()?;
            let seed = fields
                .as_deref()
                .map(parse_fields)
                .transpose()?
                .unwrap_or_default();
            let session = Session {
                device,
                seed,
                with_constants: !no_constants,
                events,
                concurrent: *concurrent,
            };
            run_local(session.run(&cli, config))
        }
    }
}

fn run_local(future: impl Future<Output = Result<()>>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    LocalSet::new().block_on(&runtime, future)
}

fn transport(cli: &Cli) -> Result<HttpTransport> {
    let transport = match cli.timeout_secs {
        Some(secs) => HttpTransport::with_timeout(&cli.url, Duration::from_secs(secs)),
        None => HttpTransport::new(&cli.url),
    };
    transport.with_context(|| format!("service url {}", cli.url))
}

fn client(
    cli: &Cli,
    config: &FormConfig,
    store: Rc<MemoryFieldStore>,
) -> Result<RecomputeClient<Rc<MemoryFieldStore>, HttpTransport>> {
    let credential = Credential::new(config.credential_header.clone(), cli.token.clone());
    Ok(RecomputeClient::from_config(store, transport(cli)?, credential, config))
}

async fn constants(cli: &Cli, config: FormConfig, device: String) -> Result<()> {
    let client = client(cli, &config, Rc::new(MemoryFieldStore::new()))?;
    let constants = client
        .fetch_constants(&device)
        .await
        .with_context(|| format!("constants of {device}"))?;
    let printable: IndexMap<&str, &str> = constants.iter().collect();
    println!("{}", serde_json::to_string_pretty(&printable)?);
    Ok(())
}

fn parse_fields(json: &str) -> Result<IndexMap<String, String>> {
    let values: IndexMap<String, serde_json::Value> =
        serde_json::from_str(json).context("--fields must be a JSON object")?;
    Ok(values
        .into_iter()
        .map(|(name, value)| {
            let text = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            (name, text)
        })
        .collect())
}

#[derive(Debug, PartialEq)]
enum ScriptedEvent {
    Blur { field: String, value: Option<String> },
    Key(String),
    Change(String),
}

impl ScriptedEvent {
    fn parse(spec: &str) -> Result<Self> {
        let Some((kind, rest)) = spec.split_once(':') else {
            bail!("event `{spec}` has no kind, expected e.g. `blur:ni=1e16`");
        };
        if rest.is_empty() {
            bail!("event `{spec}` has no target");
        }
        Ok(match kind {
            "blur" => match rest.split_once('=') {
                Some((field, value)) => ScriptedEvent::Blur {
                    field: field.to_string(),
                    value: Some(value.to_string()),
                },
                None => ScriptedEvent::Blur {
                    field: rest.to_string(),
                    value: None,
                },
            },
            "key" => ScriptedEvent::Key(rest.to_string()),
            "change" => ScriptedEvent::Change(rest.to_string()),
            other => bail!("unknown event kind `{other}` in `{spec}`"),
        })
    }
}

/// Runs spawned recomputes on the surrounding `LocalSet`.
#[derive(Default)]
struct LocalSpawner {
    handles: RefCell<Vec<JoinHandle<()>>>,
}

impl LocalSpawner {
    async fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.borrow_mut());
        for handle in handles {
            if let Err(error) = handle.await {
                log::error!("recompute task panicked: {error}");
            }
        }
    }
}

impl Spawner for LocalSpawner {
    fn spawn(&self, task: LocalTask) {
        self.handles.borrow_mut().push(tokio::task::spawn_local(task));
    }
}

/// A headless page has nowhere to go; remember the target instead.
#[derive(Default)]
struct PrintNavigator {
    target: RefCell<Option<String>>,
}

impl Navigator for PrintNavigator {
    fn navigate(&self, url: &str) {
        *self.target.borrow_mut() = Some(url.to_string());
    }
}

struct Session {
    device: String,
    seed: IndexMap<String, String>,
    with_constants: bool,
    events: Vec<ScriptedEvent>,
    concurrent: bool,
}

impl Session {
    /// The diode form as rendered by the service, before any input.
    fn document(&self, config: &FormConfig) -> MemoryFieldStore {
        let store = MemoryFieldStore::new().with_editable(config.device_control.clone(), self.device.clone());
        for name in ["Nd", "Na", "ni", "Vt", "Is", "Rs", "Wn", "Ileak"] {
            store.insert(name, FieldKind::Editable, "");
        }
        for name in ["Vbi", "Wp", "Id", "Vterm"] {
            store.insert(name, FieldKind::Display, "");
        }
        store.insert(config.selector.field.clone(), FieldKind::Editable, "");
        store
    }

    fn seed_into(&self, store: &MemoryFieldStore) {
        for (name, value) in &self.seed {
            if !store.contains(name) {
                store.insert(name.clone(), FieldKind::Editable, "");
            }
            store.write(name, value);
        }
    }

    async fn run(self, cli: &Cli, config: FormConfig) -> Result<()> {
        let store = Rc::new(self.document(&config));
        let client = client(cli, &config, Rc::clone(&store))?;

        if self.with_constants {
            let constants = client
                .fetch_constants(&self.device)
                .await
                .with_context(|| format!("constants of {}", self.device))?;
            constants.apply(&store);
        }
        let selector_field = config.selector.field.clone();
        let device_control = config.device_control.clone();
        let spawner = Rc::new(LocalSpawner::default());
        let navigator = Rc::new(PrintNavigator::default());
        let orchestrator = Orchestrator::new(config, client, Rc::clone(&spawner), Rc::clone(&navigator));
        // After construction, so a seeded selector value beats its initial option.
        self.seed_into(&store);

        for event in &self.events {
            let form_event = match event {
                ScriptedEvent::Blur { field, value } => {
                    if let Some(value) = value {
                        store.write(field, value);
                    }
                    FormEvent::Blur(field.clone())
                }
                ScriptedEvent::Key(name) => FormEvent::KeyDown {
                    field: selector_field.clone(),
                    key: Key::from_name(name),
                },
                ScriptedEvent::Change(device) => {
                    store.write(&device_control, device);
                    FormEvent::Change(device_control.clone())
                }
            };
            let reactions = orchestrator.dispatch(&form_event);
            log::info!("{event:?} -> {reactions:?}");
            if !self.concurrent {
                spawner.wait().await;
            }
            if navigator.target.borrow().is_some() {
                break;
            }
        }
        spawner.wait().await;

        if let Some(url) = navigator.target.borrow().as_ref() {
            println!("navigate: {url}");
            return Ok(());
        }
        println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scripted_events() {
        assert_eq!(
            ScriptedEvent::parse("blur:ni=1e16").unwrap(),
            ScriptedEvent::Blur {
                field: "ni".to_string(),
                value: Some("1e16".to_string()),
            }
        );
        assert_eq!(
            ScriptedEvent::parse("blur:Ileak").unwrap(),
            ScriptedEvent::Blur {
                field: "Ileak".to_string(),
                value: None,
            }
        );
        assert_eq!(ScriptedEvent::parse("key:ArrowUp").unwrap(), ScriptedEvent::Key("ArrowUp".to_string()));
        assert_eq!(ScriptedEvent::parse("change:led").unwrap(), ScriptedEvent::Change("led".to_string()));
    }

    #[test]
    fn rejects_bad_events() {
        assert!(ScriptedEvent::parse("ni=1e16").is_err());
        assert!(ScriptedEvent::parse("blur:").is_err());
        assert!(ScriptedEvent::parse("click:ni").is_err());
    }

    #[test]
    fn seed_fields_from_json() {
        let fields = parse_fields(r#"{"Vbi": "712.3", "Is": 1e-12}"#).unwrap();

        assert_eq!(fields["Vbi"], "712.3");
        assert_eq!(fields["Is"], "1e-12");
        assert!(parse_fields("[1]").is_err());
    }

    #[test]
    fn session_document_has_form_fields() {
        let session = Session {
            device: "led".to_string(),
            seed: IndexMap::new(),
            with_constants: false,
            events: Vec::new(),
            concurrent: false,
        };
        let store = session.document(&FormConfig::default());

        assert_eq!(store.read("deviceSelect").as_deref(), Some("led"));
        assert_eq!(store.kind("Vbi"), Some(FieldKind::Display));
        assert_eq!(store.kind("Vapp"), Some(FieldKind::Editable));
    }

    #[test]
    fn seeded_selector_value_survives_initialization() {
        let session = Session {
            device: "1N4148".to_string(),
            seed: parse_fields(r#"{"Vapp": "0.50", "Rth": "12"}"#).unwrap(),
            with_constants: false,
            events: Vec::new(),
            concurrent: false,
        };
        let config = FormConfig::default();
        let store = Rc::new(session.document(&config));
        let client = RecomputeClient::from_config(
            Rc::clone(&store),
            HttpTransport::new("http://localhost:8000").unwrap(),
            Credential::new("X-CSRFToken", ""),
            &config,
        );
        let orchestrator = Orchestrator::new(config, client, LocalSpawner::default(), PrintNavigator::default());

        session.seed_into(&store);

        assert_eq!(store.read("Vapp").as_deref(), Some("0.50"));
        assert_eq!(store.read("Rth").as_deref(), Some("12"));
        assert_eq!(orchestrator.selector_index(), 20);
    }
}
