//! The one context object an application constructs at startup

use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::navigator::alert::AlertHost;
use crate::navigator::back::{BackDispatcher, BackSignal};
use crate::navigator::bus::EventBus;
use crate::navigator::channels::ExitRequested;
use crate::navigator::imperative::ImperativeBridge;
use crate::navigator::manager::WindowManager;
use crate::navigator::toast::ToastManager;

/// Bus, window stack, back dispatcher, imperative bridge and toasts,
/// wired together from a [`Config`].
///
/// A back signal that finds the stack empty publishes [`ExitRequested`].
#[derive(Clone)]
pub struct AppShell {
    config: Config,
    bus: EventBus,
    windows: WindowManager,
    back: BackDispatcher,
    objects: ImperativeBridge,
    toasts: ToastManager,
}

impl AppShell {
    pub fn new(config: &Config) -> Self {
        let bus = EventBus::new();
        let windows =
            WindowManager::with_exit_transition(bus.clone(), config.windows.exit_transition());

        let exit_bus = bus.clone();
        let back = BackDispatcher::new(windows.clone()).on_unhandled(move || {
            info!("Back signal on empty stack, requesting exit");
            exit_bus.publish::<ExitRequested>(());
        });

        Self {
            config: config.clone(),
            objects: ImperativeBridge::new(bus.clone()),
            toasts: ToastManager::new(bus.clone(), config.toasts.clone()),
            bus,
            windows,
            back,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn windows(&self) -> &WindowManager {
        &self.windows
    }

    pub fn back(&self) -> &BackDispatcher {
        &self.back
    }

    pub fn objects(&self) -> &ImperativeBridge {
        &self.objects
    }

    pub fn toasts(&self) -> &ToastManager {
        &self.toasts
    }

    /// New alert call site bound to this shell's window stack
    pub fn alerts(&self) -> AlertHost {
        AlertHost::new(&self.windows)
    }

    /// Start consuming platform back presses
    pub fn listen_back(&self) -> (mpsc::UnboundedSender<BackSignal>, JoinHandle<()>) {
        self.back.listen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::back::BackOutcome;
    use crate::navigator::window::{Component, WindowManifest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Blank;

    impl Component for Blank {
        fn describe(&self) -> String {
            "blank".to_string()
        }
    }

    #[tokio::test]
    async fn test_back_on_empty_stack_requests_exit() {
        let shell = AppShell::new(&Config::default());
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        let _subscription = shell.bus().subscribe_scoped::<ExitRequested, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let manifest = WindowManifest::new("Blank", |_: ()| Box::new(Blank) as Box<dyn Component>);
        let key = shell.windows().create_window(&manifest, ());

        assert_eq!(shell.back().dispatch().await, BackOutcome::Popped(key));
        assert_eq!(exits.load(Ordering::SeqCst), 0);

        assert_eq!(shell.back().dispatch().await, BackOutcome::Unhandled);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_pops_through_shell() {
        let shell = AppShell::new(&Config::default());
        let manifest = WindowManifest::new("Blank", |_: ()| Box::new(Blank) as Box<dyn Component>);
        shell.windows().create_window(&manifest, ());

        let (signals, listener) = shell.listen_back();
        signals.send(BackSignal).unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !shell.windows().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("window must be popped");

        drop(signals);
        listener.await.unwrap();
    }

    #[test]
    fn test_settings_flow_from_config() {
        let mut config = Config::default();
        config.toasts.short_ms = 1234;
        let shell = AppShell::new(&config);
        assert_eq!(
            shell.toasts().lifetime(crate::navigator::toast::ToastDuration::Short),
            Duration::from_millis(1234)
        );
        assert_eq!(shell.config(), &config);
    }
}
