use super::shell::{self, Shell};
use super::template::{expand_env_vars, fill};
use super::{wol, ActionExecutor, ActionFuture, ActionOutcome};
use crate::config::schema::{CommandStep, DictationPhase, MediaKey, VolumeOp};
use crate::config::MappingStore;
use crate::error::PadError;
use futures::FutureExt;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Executor for the host machine.
///
/// Processes, shell and PowerShell commands, URLs and Wake-on-LAN are handled
/// directly. The remaining kinds (shortcuts, media keys, volume, audio
/// devices, speech, TV) go through the command templates configured under
/// `[backends]`, read from the live configuration on every call.
pub struct SystemExecutor {
    store: Arc<MappingStore>,
    toggled: Arc<Mutex<HashMap<String, Child>>>,
}

impl SystemExecutor {
    pub fn new(store: Arc<MappingStore>) -> Self {
        Self {
            store,
            toggled: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn backend(&self, kind: &'static str, vars: &[(&str, &str)]) -> ActionFuture {
        let config = self.store.current();
        let Some(template) = config.backends.get(kind) else {
            return futures::future::ready(Err(PadError::action(
                kind,
                format!("no backend configured (add `{kind}` under [backends])"),
            )))
            .boxed();
        };
        let line = fill(template, vars);
        async move {
            info!("running {kind} backend: {line}");
            shell::execute(Shell::System, &line).await?;
            Ok(ActionOutcome::done())
        }
        .boxed()
    }
}

/// Command that launches `path` the way a double-click would. On Windows
/// this goes through `start`, which resolves documents and App Paths
/// entries, so the child is a short-lived `cmd` and not the program.
#[cfg(windows)]
fn detached_command(path: &str, args: &[String]) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).raw_arg(cmd_quote(path));
    for arg in args {
        cmd.raw_arg(cmd_quote(arg));
    }
    cmd
}

#[cfg(not(windows))]
fn detached_command(path: &str, args: &[String]) -> Command {
    direct_command(path, args)
}

/// Command whose child is the program itself.
fn direct_command(path: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(path);
    cmd.args(args);
    cmd
}

fn spawn(mut cmd: Command) -> std::io::Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false)
        .spawn()
}

fn expanded(path: &str, args: &[String]) -> (String, Vec<String>) {
    (
        expand_env_vars(path),
        args.iter().map(|a| expand_env_vars(a)).collect(),
    )
}

/// Quote one argument for `cmd.exe`. Inside double quotes `&`, `|`, `<`,
/// `>` and `^` are taken literally; a `"` cannot be escaped there and is
/// dropped.
#[cfg_attr(not(windows), allow(dead_code))]
fn cmd_quote(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', ""))
}

fn toggle_key(path: &str, args: &[String]) -> String {
    let mut key = path.to_string();
    for arg in args {
        key.push('\0');
        key.push_str(arg);
    }
    key
}

fn with_scheme(url: &str) -> String {
    if url.contains("://") || url.starts_with("mailto:") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Host {
    Windows,
    MacOs,
    Unix,
}

impl Host {
    fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Unix
        }
    }

    /// Program and arguments that hand `url` to the default handler. None
    /// of them runs through a command interpreter.
    fn opener(self, url: &str) -> (&'static str, Vec<String>) {
        match self {
            Self::Windows => (
                "rundll32",
                vec!["url.dll,FileProtocolHandler".to_string(), url.to_string()],
            ),
            Self::MacOs => ("open", vec![url.to_string()]),
            Self::Unix => ("xdg-open", vec![url.to_string()]),
        }
    }
}

fn lock_toggled(
    toggled: &Mutex<HashMap<String, Child>>,
) -> std::sync::MutexGuard<'_, HashMap<String, Child>> {
    toggled.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ActionExecutor for SystemExecutor {
    fn launch_path(&self, path: &str, args: &[String]) -> ActionFuture {
        let (path, args) = expanded(path, args);
        async move {
            let child = spawn(detached_command(&path, &args))
                .map_err(|e| PadError::action("launch_path", format!("{path}: {e}")))?;
            info!("launched {path}");
            Ok(ActionOutcome::with_detail(format!(
                "started {path} (pid {})",
                child.id().unwrap_or_default()
            )))
        }
        .boxed()
    }

    fn toggle_process(&self, path: &str, args: &[String], on: bool) -> ActionFuture {
        let key = toggle_key(path, args);
        let (path, args) = expanded(path, args);
        let toggled = Arc::clone(&self.toggled);
        async move {
            if on {
                if let Some(child) = lock_toggled(&toggled).get_mut(&key) {
                    if matches!(child.try_wait(), Ok(None)) {
                        return Ok(ActionOutcome::with_detail(format!("{path} already running")));
                    }
                }
                // Spawned directly so the handle we keep is the program.
                let child = spawn(direct_command(&path, &args))
                    .map_err(|e| PadError::action("toggle_process", format!("{path}: {e}")))?;
                info!("toggled on {path} (pid {})", child.id().unwrap_or_default());
                lock_toggled(&toggled).insert(key, child);
                return Ok(ActionOutcome::with_detail(format!("started {path}")));
            }

            let taken = lock_toggled(&toggled).remove(&key);
            let Some(mut child) = taken else {
                return Ok(ActionOutcome::with_detail(format!(
                    "{path} was not started by easypad"
                )));
            };
            if let Ok(Some(status)) = child.try_wait() {
                debug!("{path} exited before toggle off: {status}");
                return Ok(ActionOutcome::with_detail(format!("{path} had already exited")));
            }
            child.kill().await.map_err(|e| {
                PadError::action("toggle_process", format!("could not stop {path}: {e}"))
            })?;
            Ok(ActionOutcome::with_detail(format!("stopped {path}")))
        }
        .boxed()
    }

    fn open_url(&self, url: &str) -> ActionFuture {
        let url = with_scheme(url);
        async move {
            let (program, args) = Host::current().opener(&url);
            let status = Command::new(program)
                .args(&args)
                .kill_on_drop(false)
                .status()
                .await?;
            if status.success() {
                Ok(ActionOutcome::with_detail(format!("opened {url}")))
            } else {
                Err(PadError::action("open_url", format!("{url}: opener exited with {status}")))
            }
        }
        .boxed()
    }

    fn shell_command(&self, commands: &[CommandStep]) -> ActionFuture {
        let steps = commands.to_vec();
        async move {
            shell::run_steps(Shell::System, &steps).await?;
            Ok(ActionOutcome::done())
        }
        .boxed()
    }

    fn powershell_command(&self, commands: &[CommandStep]) -> ActionFuture {
        let steps = commands.to_vec();
        async move {
            shell::run_steps(Shell::PowerShell, &steps).await?;
            Ok(ActionOutcome::done())
        }
        .boxed()
    }

    fn keyboard_shortcut(&self, keys: &str) -> ActionFuture {
        self.backend("keyboard_shortcut", &[("keys", keys)])
    }

    fn media_control(&self, control: MediaKey) -> ActionFuture {
        self.backend("media_control", &[("control", control.as_str())])
    }

    fn volume_adjust(&self, op: VolumeOp, amount: u8) -> ActionFuture {
        let amount = amount.to_string();
        self.backend("volume_adjust", &[("op", op.as_str()), ("amount", &amount)])
    }

    fn audio_device_switch(&self, device: Option<&str>) -> ActionFuture {
        self.backend("audio_device_switch", &[("device", device.unwrap_or(""))])
    }

    fn speech_to_text(&self, language: &str, phase: DictationPhase) -> ActionFuture {
        self.backend(
            "speech_to_text",
            &[("language", language), ("phase", phase.as_str())],
        )
    }

    fn text_to_speech(&self, text: &str, language: Option<&str>) -> ActionFuture {
        self.backend(
            "text_to_speech",
            &[("text", text), ("language", language.unwrap_or(""))],
        )
    }

    fn wake_on_lan(&self, mac: &str, broadcast: &str) -> ActionFuture {
        let mac = mac.to_string();
        let broadcast = broadcast.to_string();
        async move {
            wol::wake(&mac, &broadcast).await?;
            Ok(ActionOutcome::with_detail(format!("woke {mac}")))
        }
        .boxed()
    }

    fn tv_control(&self, command: &str, value: Option<&str>, host: Option<&str>) -> ActionFuture {
        self.backend(
            "tv_control",
            &[
                ("command", command),
                ("value", value.unwrap_or("")),
                ("host", host.unwrap_or("")),
            ],
        )
    }
}
