use std::sync::Arc;

use anyhow::Result;
use arboard::Clipboard;
use murmur::actuate::EnigoActuator;
use murmur::event::MurmurEvent;
use murmur::notify;
use murmur::{
    APP_NAME_PRETTY, Config, ConfigManager, CpalAudioSource, DEFAULT_LOG_LEVEL, DictationSession,
    RecognizerFactory, SessionEvent, SessionState, VERSION, icon,
};
use parking_lot::RwLock;
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tray_icon::menu::{AboutMetadataBuilder, Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{TrayIconBuilder, TrayIconEvent};

const LABEL_START: &str = "Start dictation";
const LABEL_STOP: &str = "Stop dictation";

fn main() -> Result<()> {
    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MURMUR_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .init();

    // Load config
    let config_manager = ConfigManager::new()?;
    let config = Arc::new(RwLock::new(config_manager.load()?));
    // save back the config to create the file if it doesn't exist
    config_manager.save(&config.read())?;

    let mut clipboard = Clipboard::new()?;

    // Create the tray menu
    let tray_menu = Menu::new();
    let item_toggle = MenuItem::new(LABEL_START, true, None);
    let item_copy_config = MenuItem::new("Copy config path", true, None);
    let item_quit = MenuItem::new("Quit", true, None);
    tray_menu.append_items(&[
        &MenuItem::new(APP_NAME_PRETTY, false, None),
        &PredefinedMenuItem::separator(),
        &item_toggle,
        &PredefinedMenuItem::separator(),
        &PredefinedMenuItem::about(
            None,
            Some(
                AboutMetadataBuilder::new()
                    .version(Some(VERSION.to_owned()))
                    .build(),
            ),
        ),
        &item_copy_config,
        &PredefinedMenuItem::separator(),
        &item_quit,
    ])?;

    // Set up the event loop
    let mut icon_tray = None;

    let menu_channel = MenuEvent::receiver();
    let tray_channel = TrayIconEvent::receiver();

    let event_loop: EventLoop<MurmurEvent> = EventLoopBuilder::with_user_event().build();

    // Set up the dictation session; its events are forwarded into the loop
    let (events_tx, events_rx) = unbounded_channel();
    let session = build_session(config.clone(), events_tx)?;
    spawn_event_forwarder(events_rx, event_loop.create_proxy());

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        if let Event::NewEvents(StartCause::Init) = event {
            // We create the icon once the event loop is actually running
            // to prevent issues like https://github.com/tauri-apps/tray-icon/issues/90

            icon_tray.replace(
                TrayIconBuilder::new()
                    .with_menu(Box::new(tray_menu.clone()))
                    .with_tooltip("murmur - dictation")
                    .with_icon(icon::icon_for(SessionState::Idle))
                    .build()
                    .unwrap(),
            );

            // We have to request a redraw here to have the icon actually show up.
            // Tao only exposes a redraw method on the Window so we use core-foundation directly.
            #[cfg(target_os = "macos")]
            unsafe {
                use core_foundation::runloop::{CFRunLoopGetMain, CFRunLoopWakeUp};

                let rl = CFRunLoopGetMain();
                CFRunLoopWakeUp(rl);
            }

            info!("Murmur ready");
        }

        if let Ok(event) = menu_channel.try_recv() {
            if event.id == item_quit.id() {
                if let Err(e) = session.stop() {
                    error!("Failed to stop dictation on quit: {}", e);
                }
                icon_tray.take();
                *control_flow = ControlFlow::Exit;
            } else if event.id == item_toggle.id() {
                toggle_session(&session, &config);
            } else if event.id == item_copy_config.id() {
                if let Err(e) =
                    clipboard.set_text(config_manager.config_path().to_string_lossy().into_owned())
                {
                    error!("Failed to copy config path to clipboard: {}", e);
                }
            }
        }

        #[expect(clippy::redundant_pattern_matching)]
        if let Ok(_) = tray_channel.try_recv() {
            // Handle tray icon events
        }

        // Handle session events
        if let Event::UserEvent(MurmurEvent::Session(event)) = event {
            match event {
                SessionEvent::Started => {
                    info!("Dictation started");
                    item_toggle.set_text(LABEL_STOP);
                    if let Some(tray) = icon_tray.as_ref() {
                        tray.set_icon(Some(icon::icon_for(SessionState::Listening)))
                            .ok();
                    }
                }
                SessionEvent::Stopped => {
                    info!("Dictation stopped");
                    item_toggle.set_text(LABEL_START);
                    if let Some(tray) = icon_tray.as_ref() {
                        tray.set_icon(Some(icon::icon_for(SessionState::Idle))).ok();
                        tray.set_tooltip(Some("murmur - dictation")).ok();
                    }
                }
                SessionEvent::Failed(reason) => {
                    error!("Dictation failed: {}", reason);
                    notify::session_failed(&reason);
                    item_toggle.set_text(LABEL_START);
                    if let Some(tray) = icon_tray.as_ref() {
                        tray.set_icon(Some(icon::icon_for(SessionState::Idle))).ok();
                        tray.set_tooltip(Some("murmur - dictation")).ok();
                    }
                }
                SessionEvent::TranscriptPreview(text) => {
                    // Live feedback in the only place a menu-bar app has
                    if let Some(tray) = icon_tray.as_ref() {
                        tray.set_tooltip(Some(&text)).ok();
                    }
                }
            }
        }
    });
}

fn build_session(
    config: Arc<RwLock<Config>>,
    events: UnboundedSender<SessionEvent>,
) -> Result<DictationSession> {
    let audio = Arc::new(CpalAudioSource::new());
    let actuator = Arc::new(EnigoActuator::new()?);
    DictationSession::new(audio, actuator, recognizer_factory(config), events)
}

fn toggle_session(session: &DictationSession, config: &Arc<RwLock<Config>>) {
    if session.state().is_active() {
        if let Err(e) = session.stop() {
            error!("Failed to stop dictation: {}", e);
        }
    } else {
        // Snapshot the config; edits take effect on the next start
        let snapshot = config.read().clone();
        if let Err(e) = session.start(&snapshot) {
            error!("Failed to start dictation: {}", e);
            notify::start_failed(&e.to_string());
        }
    }
}

/// Bridge session events from the tokio channel onto the tao event loop.
fn spawn_event_forwarder(
    mut events: UnboundedReceiver<SessionEvent>,
    proxy: EventLoopProxy<MurmurEvent>,
) {
    std::thread::spawn(move || {
        while let Some(event) = events.blocking_recv() {
            if proxy.send_event(MurmurEvent::Session(event)).is_err() {
                break;
            }
        }
    });
}

#[cfg(feature = "local-whisper")]
fn recognizer_factory(config: Arc<RwLock<Config>>) -> RecognizerFactory {
    use murmur_transcribe::{
        LocalWhisperConfig, TranscriptionBackend, WhisperBackend, WhisperModel,
    };

    Box::new(move |request| {
        let model = config
            .read()
            .local_model
            .as_deref()
            .and_then(WhisperModel::from_name)
            .unwrap_or_default();

        let backend: Arc<dyn TranscriptionBackend> =
            Arc::new(WhisperBackend::new(LocalWhisperConfig {
                model,
                model_path: None,
                locale: request.locale.clone(),
            }));
        Ok(backend)
    })
}

#[cfg(not(feature = "local-whisper"))]
fn recognizer_factory(_config: Arc<RwLock<Config>>) -> RecognizerFactory {
    use murmur_transcribe::BackendError;

    Box::new(|_request| {
        Err(BackendError::Engine(
            "no on-device recognizer in this build; set backend = \"remote-api\" \
             or rebuild with the local-whisper feature"
                .to_string(),
        ))
    })
}
