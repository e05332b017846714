use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use ntag_core::layout::{self, Monitor};
use ntag_experiment::session::{QUIT_POLL_FRAMES, STT_KEY};
use ntag_experiment::{Condition, SegmentKind, SessionConfig, SessionState, SpellerSession};
use ntag_marker::{MarkerSink, open_sink};
use ntag_render::load_font;
use ntag_timing::{FrameClock, MonotonicClock};
use pixels::{Pixels, SurfaceTexture};
use rand::rngs::ThreadRng;
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

use crate::keyboard::Keyboard;

/// Runs a participant's condition schedule in one fullscreen window.
///
/// Each redraw presents exactly one frame: the session plans it, the
/// keyboard composes it, the surface commits it, and the flip is reported
/// back so markers land on their frame boundaries.
pub struct SpellerApp {
    config: SessionConfig,
    schedule: VecDeque<Condition>,
    run_index: usize,
    rng: ThreadRng,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,

    clock: MonotonicClock,
    keyboard: Option<Keyboard>,
    session: Option<SpellerSession>,
    outlet: Option<Box<dyn MarkerSink>>,
    last_segment: Option<SegmentKind>,
    run_frames: usize,
    quit_requested: bool,
    should_exit: bool,
}

impl SpellerApp {
    pub fn new(config: SessionConfig, schedule: Vec<Condition>) -> Self {
        Self {
            config,
            schedule: schedule.into(),
            run_index: 0,
            rng: rand::rng(),
            window: None,
            pixels: None,
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            clock: MonotonicClock::new(),
            keyboard: None,
            session: None,
            outlet: None,
            last_segment: None,
            run_frames: 0,
            quit_requested: false,
            should_exit: false,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        println!("Press any key to start each run, ESC or Q to abort.\n");
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .context("No monitor available")?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Noise-tagging speller")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.scale_factor = window.scale_factor();
        self.current_size = Some(physical_size);

        info!(
            width = physical_size.width,
            height = physical_size.height,
            scale = self.scale_factor,
            refresh_hz = self.refresh_rate,
            "display configured"
        );

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    /// Tears down the previous condition and sets up the next one: fresh
    /// marker stream (postfix = run number), fresh session, keyboard
    /// rebuilt from the condition's tile set.
    fn start_next_condition(&mut self) -> Result<()> {
        let Some(condition) = self.schedule.pop_front() else {
            info!("schedule exhausted");
            self.should_exit = true;
            return Ok(());
        };
        let size = self.current_size.context("window not created yet")?;
        self.run_index += 1;

        let mut config = self.config.clone();
        config.monitor = Monitor {
            size_px: (size.width, size.height),
            ..self.config.monitor
        };

        let outlet = open_sink(config.stream, &config.log_dir, &self.run_index.to_string())?;
        let session = SpellerSession::new(config.clone(), condition, &mut self.rng)?;
        let keyboard = Self::build_keyboard(&config, &session, (size.width, size.height))?;
        session.validate_keys(|name| keyboard.variant_count(name))?;

        info!(
            condition = %condition.label(),
            run = self.run_index,
            stream = outlet.name(),
            trials = session.trial_count(),
            "condition ready"
        );
        println!("Press button to start.");

        self.clock = MonotonicClock::new();
        self.outlet = Some(outlet);
        self.session = Some(session);
        self.keyboard = Some(keyboard);
        self.last_segment = None;
        self.run_frames = 0;
        Ok(())
    }

    fn build_keyboard(
        config: &SessionConfig,
        session: &SpellerSession,
        window_px: (u32, u32),
    ) -> Result<Keyboard> {
        let font = load_font(&config.font_path)?;
        let mut keyboard = Keyboard::new(window_px, config.background, font)?;

        let files: HashMap<&str, Vec<String>> = session.key_variant_files().into_iter().collect();
        let spec = &config.layout;
        let monitor = &config.monitor;

        let stt = layout::place_stt(spec, monitor);
        keyboard.add_key(&stt, &config.image_dir, &files[STT_KEY])?;

        keyboard.add_text_field(&layout::place_text_field(spec, monitor));

        for placement in layout::place_grid(session.grid(), spec, monitor) {
            let variants = files
                .get(placement.name.as_str())
                .with_context(|| format!("no tile files for key '{}'", placement.name))?;
            keyboard.add_key(&placement, &config.image_dir, variants)?;
        }

        keyboard.set_field_text(session.field_text());
        Ok(keyboard)
    }

    /// Presents one frame and handles everything anchored to its flip.
    fn redraw(&mut self) -> Result<()> {
        let (Some(session), Some(keyboard), Some(pixels)) = (
            self.session.as_mut(),
            self.keyboard.as_mut(),
            self.pixels.as_mut(),
        ) else {
            return Ok(());
        };

        keyboard.set_field_text(session.field_text());
        let plan = session.frame_plan();
        let data = keyboard.compose(&plan)?;
        pixels.frame_mut().copy_from_slice(data);
        pixels.render()?;
        self.clock.mark_flip();

        let markers = session.after_flip();
        if let Some(outlet) = self.outlet.as_mut() {
            for marker in &markers {
                outlet.push(marker)?;
            }
        }

        let segment = session.segment_kind();
        if segment != self.last_segment {
            if let Some((trial, total, target)) = session.trial_progress() {
                if matches!(segment, Some(SegmentKind::Cue { .. })) {
                    info!("{trial:03}/{total:03}\t{target}");
                }
            }
            self.last_segment = segment;
        }

        // Quit is polled, not immediate, while a segment runs.
        if session.state() == SessionState::Running {
            self.run_frames += 1;
            if self.run_frames % QUIT_POLL_FRAMES == 0 && self.quit_requested {
                warn!("quit requested, aborting run");
                self.should_exit = true;
                return Ok(());
            }
        }

        if session.state() == SessionState::Finished {
            self.start_next_condition()?;
        }
        Ok(())
    }

    fn begin_run(&mut self) -> Result<()> {
        let measured = {
            let stats = self.clock.refresh_stats();
            if self.clock.flip_count() >= 60 && stats.rounded_hz() > 0 {
                stats.rounded_hz()
            } else {
                self.config.frame_rate_hz
            }
        };
        let session = self.session.as_mut().context("no active session")?;
        let markers = session.begin(measured)?;
        if let Some(outlet) = self.outlet.as_mut() {
            for marker in &markers {
                outlet.push(marker)?;
            }
        }
        info!(measured_hz = measured, "run started");
        self.run_frames = 0;
        Ok(())
    }

    fn handle_input(&mut self, key: winit::keyboard::PhysicalKey, event_loop: &ActiveEventLoop) {
        use winit::keyboard::{KeyCode, PhysicalKey};
        let PhysicalKey::Code(keycode) = key else {
            return;
        };
        let state = self.session.as_ref().map(|s| s.state());
        match keycode {
            KeyCode::Escape | KeyCode::KeyQ => {
                self.quit_requested = true;
                // Outside a running segment there is no poll loop to notice
                // the flag; tear down immediately.
                if state != Some(SessionState::Running) {
                    self.cleanup_and_exit(event_loop);
                }
            }
            KeyCode::KeyC => {
                if state == Some(SessionState::AwaitingEnd) {
                    if let Some(session) = self.session.as_mut() {
                        session.finish();
                    }
                }
            }
            _ => {
                if state == Some(SessionState::AwaitingStart) {
                    if let Err(e) = self.begin_run() {
                        error!("failed to start run: {e:#}");
                        self.cleanup_and_exit(event_loop);
                    }
                }
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!("failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!("failed to resize buffer: {e}");
            }
        }
        // The keyboard's canvas and placements are sized to the surface;
        // rebuild them around the unchanged session.
        if let Some(session) = &self.session {
            let mut config = self.config.clone();
            config.monitor = Monitor {
                size_px: (new_size.width, new_size.height),
                ..self.config.monitor
            };
            match Self::build_keyboard(&config, session, (new_size.width, new_size.height)) {
                Ok(keyboard) => self.keyboard = Some(keyboard),
                Err(e) => {
                    error!("failed to rebuild keyboard after resize: {e:#}");
                    self.should_exit = true;
                }
            }
        }
        info!(
            width = new_size.width,
            height = new_size.height,
            "display resized"
        );
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        info!(runs_completed = self.run_index, "speller closed");
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for SpellerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let outcome = self
                .create_window_and_surface(event_loop)
                .and_then(|_| self.start_next_condition());
            if let Err(e) = outcome {
                error!("failed to initialize: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!("render error: {e:#}");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if self.should_exit {
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::Resized(new_size) => self.handle_resize(new_size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}
