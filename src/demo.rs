use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compass_navigator::config::Config;
use compass_navigator::navigator::channels::ExitRequested;
use compass_navigator::navigator::{
    AlertConfig, AlertHandle, AppShell, BackButtonHandler, BackOutcome, Component, ToastDuration,
    WindowHandle, WindowManifest, WindowSnapshot,
};

struct HomeScreen {
    categories: Vec<String>,
}

impl Component for HomeScreen {
    fn describe(&self) -> String {
        format!("{} categories: {}", self.categories.len(), self.categories.join(", "))
    }
}

struct EditorProps {
    category: String,
    alerts: AlertHandle,
}

/// Asks before discarding edits on back
struct EditorScreen {
    props: EditorProps,
}

impl Component for EditorScreen {
    fn mount(&self, window: &WindowHandle) {
        let alerts = self.props.alerts.clone();
        let category = self.props.category.clone();
        window.set_back_handler(BackButtonHandler::new(move |kill| {
            let alerts = alerts.clone();
            let category = category.clone();
            async move {
                let answer = alerts
                    .show(
                        AlertConfig::new("Discard changes?")
                            .content(format!("Unsaved edits to '{}' will be lost", category))
                            .button("cancel", "Keep editing")
                            .button("confirm", "Discard"),
                    )
                    .await?;
                if answer == "confirm" {
                    kill.kill();
                }
                Ok(())
            }
        }));
    }

    fn describe(&self) -> String {
        format!("editing '{}'", self.props.category)
    }
}

#[derive(Serialize)]
struct Step {
    step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<String>,
    windows: Vec<WindowSnapshot>,
}

struct Transcript {
    json: bool,
    steps: Vec<Step>,
}

impl Transcript {
    fn record(&mut self, shell: &AppShell, step: &str, outcome: Option<BackOutcome>) {
        let step = Step {
            step: step.to_string(),
            outcome: outcome.map(|outcome| format!("{:?}", outcome)),
            windows: shell.windows().snapshots(),
        };

        if !self.json {
            match &step.outcome {
                Some(outcome) => println!("== {} -> {}", step.step, outcome),
                None => println!("== {}", step.step),
            }
            if step.windows.is_empty() {
                println!("   (no windows)");
            }
            for window in &step.windows {
                println!(
                    "   {} {:<12} {:<18} {}",
                    window.key,
                    window.manifest,
                    window.title.as_deref().unwrap_or("-"),
                    window.summary
                );
            }
        }
        self.steps.push(step);
    }

    fn finish(self) -> Result<()> {
        if self.json {
            let rendered =
                serde_json::to_string_pretty(&self.steps).context("Failed to render transcript")?;
            println!("{}", rendered);
        }
        Ok(())
    }
}

/// Scripted session: Home -> Editor -> back asks for confirmation -> confirm -> Home -> exit
pub async fn run(config: &Config, json: bool) -> Result<()> {
    let shell = AppShell::new(config);
    let alerts = shell.alerts();
    let mut transcript = Transcript {
        json,
        steps: Vec::new(),
    };

    let exit_requested = Arc::new(AtomicBool::new(false));
    let exit_flag = exit_requested.clone();
    let _exit_subscription = shell.bus().subscribe_scoped::<ExitRequested, _>(move |_| {
        exit_flag.store(true, Ordering::SeqCst);
    });

    let home = WindowManifest::new("Home", |categories: Vec<String>| {
        Box::new(HomeScreen { categories }) as Box<dyn Component>
    })
    .title_from(|_| "Categories".to_string());
    let editor = WindowManifest::new("Editor", |props: EditorProps| {
        Box::new(EditorScreen { props }) as Box<dyn Component>
    })
    .title_from(|props| format!("Edit {}", props.category))
    .animated(true);

    shell.windows().create_window(
        &home,
        vec!["Walking".to_string(), "Cycling".to_string(), "Rowing".to_string()],
    );
    transcript.record(&shell, "open home", None);

    let editor_key = shell.windows().create_window(
        &editor,
        EditorProps {
            category: "Cycling".to_string(),
            alerts: alerts.handle(),
        },
    );
    transcript.record(&shell, "open editor", None);

    let back = shell.back().clone();
    let pending = tokio::spawn(async move { back.dispatch().await });

    let windows = shell.windows().clone();
    let alert_key = tokio::time::timeout(Duration::from_secs(1), async move {
        loop {
            match windows.top() {
                Some(window) if window.manifest() == "AlertDialog" => return window.key(),
                _ => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    })
    .await
    .context("Confirmation dialog never opened")?;
    transcript.record(&shell, "back pressed on editor", None);

    let repeated = shell.back().dispatch().await;
    transcript.record(&shell, "back pressed again while confirming", Some(repeated));

    shell.windows().interact(alert_key, "confirm");
    let outcome = pending.await.context("Back dispatch task failed")?;
    info!("Editor {} back handling finished: {:?}", editor_key, outcome);
    transcript.record(&shell, "clicked 'Discard'", Some(outcome));

    shell.toasts().show("Changes discarded", ToastDuration::Short);

    let outcome = shell.back().dispatch().await;
    transcript.record(&shell, "back pressed on home", Some(outcome));

    let outcome = shell.back().dispatch().await;
    transcript.record(&shell, "back pressed on empty stack", Some(outcome));

    if !json {
        println!(
            "exit requested: {}, toasts visible: {}",
            exit_requested.load(Ordering::SeqCst),
            shell.toasts().len()
        );
    }

    transcript.finish()
}
