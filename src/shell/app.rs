#![cfg(feature = "gui")]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use eframe::egui;
use image::{Rgb, RgbImage};

use super::state::{Mode, ShellModel};
use crate::annotate::{fit_within, save_image, HudOverlay};
use crate::config::AppConfig;
use crate::ingest::file::{is_supported_upload, UPLOAD_EXTENSIONS};
use crate::ingest::CameraSource;
use crate::pipeline::{
    CameraWorker, DetectionContext, ImageJob, LiveSettings, WorkerControl, WorkerEvent,
};
use crate::session::{key_to_command, SessionCommand, SessionSummary};

const REPAINT_INTERVAL: Duration = Duration::from_millis(15);
const RESULT_MAX_SIDE: f32 = 800.0;
const WINDOW_TITLE: &str = "Live Detect";

/// Things the UI asked for this frame; applied after drawing.
#[derive(Clone, Debug, PartialEq)]
enum UiAction {
    LaunchCamera,
    UploadImage,
    PickColor,
    ApplyColor(Option<Rgb<u8>>),
    SetThreshold(u8),
    Session(SessionCommand),
    SaveResult,
    CloseResult,
    DismissSummary,
    Exit,
}

struct ResultView {
    image: RgbImage,
    source: PathBuf,
    texture: Option<egui::TextureHandle>,
}

/// Desktop front end: control panel, live camera view and result windows.
pub struct LiveDetectApp {
    config: AppConfig,
    model: ShellModel,
    /// `None` while a worker or image job holds it.
    context: Option<DetectionContext>,
    worker: Option<CameraWorker>,
    image_job: Option<ImageJob>,
    camera_texture: Option<egui::TextureHandle>,
    live_hud: Option<HudOverlay>,
    result: Option<ResultView>,
    picker_color: [u8; 3],
    threshold_slider: u8,
}

impl LiveDetectApp {
    pub fn new(config: AppConfig, context: DetectionContext) -> Self {
        let model = ShellModel::new(config.threshold_percent, config.person_color);
        let picker_color = model.person_color().0;
        let threshold_slider = model.threshold_percent();
        Self {
            config,
            model,
            context: Some(context),
            worker: None,
            image_job: None,
            camera_texture: None,
            live_hud: None,
            result: None,
            picker_color,
            threshold_slider,
        }
    }

    /// Open the window and block until it closes.
    pub fn run(self) -> Result<()> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([960.0, 720.0])
                .with_title(WINDOW_TITLE),
            ..Default::default()
        };
        eframe::run_native(WINDOW_TITLE, options, Box::new(move |_cc| Ok(Box::new(self))))
            .map_err(|e| anyhow!("gui exited with error: {}", e))
    }

    fn return_context(&mut self, mut context: DetectionContext) {
        context.colors.set_person_color(self.model.person_color());
        self.context = Some(context);
    }

    /// Rebuild the detector after a worker thread died with it.
    fn rebuild_context(&mut self) {
        match DetectionContext::from_config(&self.config) {
            Ok(context) => self.return_context(context),
            Err(err) => {
                log::error!("LiveDetectApp: failed to reload detector: {:#}", err);
                self.model.image_failed(&err);
            }
        }
    }

    fn launch_camera(&mut self) {
        if !self.model.request_camera() {
            return;
        }
        let Some(context) = self.context.take() else {
            self.model.camera_failed(&anyhow!("detector is busy"));
            return;
        };
        let source = match CameraSource::new(self.config.camera.clone()) {
            Ok(source) => source,
            Err(err) => {
                self.return_context(context);
                self.model.camera_failed(&err);
                return;
            }
        };
        let mut settings = LiveSettings::from_config(&self.config);
        settings.threshold_percent = self.model.threshold_percent();

        log::info!("LiveDetectApp: launching camera {}", self.config.camera.device);
        match CameraWorker::spawn(context, Box::new(source), settings) {
            Ok(worker) => self.worker = Some(worker),
            Err(err) => {
                self.model.camera_failed(&err);
                self.rebuild_context();
            }
        }
    }

    fn upload_image(&mut self) {
        if !self.model.request_upload() {
            return;
        }
        let picked = rfd::FileDialog::new()
            .set_title("Upload Image")
            .add_filter("Image Files", UPLOAD_EXTENSIONS)
            .pick_file();
        let Some(path) = picked else {
            self.model.upload_cancelled();
            return;
        };
        if !is_supported_upload(&path) {
            self.model.image_failed(&anyhow!(
                "{} is not a png or jpg image",
                path.display()
            ));
            return;
        }
        let Some(context) = self.context.take() else {
            self.model.image_failed(&anyhow!("detector is busy"));
            return;
        };
        let cutoff = crate::annotate::percent_to_cutoff(self.model.threshold_percent());
        self.result = None;
        self.model.upload_started();
        match ImageJob::spawn(context, path, cutoff) {
            Ok(job) => self.image_job = Some(job),
            Err(err) => {
                self.model.image_failed(&err);
                self.rebuild_context();
            }
        }
    }

    fn save_result(&mut self) {
        let Some(result) = &self.result else {
            return;
        };
        let suggested = result
            .source
            .file_stem()
            .map(|stem| format!("{}_detected.png", stem.to_string_lossy()))
            .unwrap_or_else(|| "detected.png".to_string());
        let picked = rfd::FileDialog::new()
            .set_title("Save Image")
            .set_file_name(suggested)
            .add_filter("PNG Files", &["png"])
            .add_filter("JPEG Files", &["jpg", "jpeg"])
            .save_file();
        let Some(path) = picked else {
            return;
        };
        match save_image(&result.image, &path) {
            Ok(written) => self.model.image_saved(&written),
            Err(err) => {
                log::error!("LiveDetectApp: {:#}", err);
                self.model.save_failed(&err);
            }
        }
    }

    fn apply_color(&mut self, color: Option<Rgb<u8>>) {
        let Some(color) = self.model.finish_pick_color(color) else {
            self.picker_color = self.model.person_color().0;
            return;
        };
        if let Some(worker) = &self.worker {
            worker.send(WorkerControl::SetPersonColor(color));
        }
        if let Some(context) = &mut self.context {
            context.colors.set_person_color(color);
        }
    }

    fn set_threshold(&mut self, percent: u8) {
        let percent = self.model.set_threshold(percent);
        if let Some(worker) = &self.worker {
            worker.send(WorkerControl::SetThreshold(percent));
        }
    }

    fn session_command(&mut self, command: SessionCommand) {
        let Some(worker) = &self.worker else {
            return;
        };
        match command {
            SessionCommand::Exit => worker.stop(),
            SessionCommand::ToggleOverlay => {
                if worker.send(WorkerControl::Command(command)) {
                    self.model.overlay_toggled();
                }
            }
            SessionCommand::TogglePause => {
                worker.send(WorkerControl::Command(command));
            }
        }
    }

    fn exit(&mut self, ctx: &egui::Context) {
        self.model.request_exit();
        if let Some(worker) = self.worker.take() {
            worker.stop();
            drop(worker);
        }
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn apply(&mut self, ctx: &egui::Context, action: UiAction) {
        match action {
            UiAction::LaunchCamera => self.launch_camera(),
            UiAction::UploadImage => self.upload_image(),
            UiAction::PickColor => {
                self.picker_color = self.model.person_color().0;
                self.model.begin_pick_color();
            }
            UiAction::ApplyColor(color) => self.apply_color(color),
            UiAction::SetThreshold(percent) => self.set_threshold(percent),
            UiAction::Session(command) => self.session_command(command),
            UiAction::SaveResult => self.save_result(),
            UiAction::CloseResult => {
                self.result = None;
                self.model.image_closed();
            }
            UiAction::DismissSummary => self.model.dismiss_summary(),
            UiAction::Exit => self.exit(ctx),
        }
    }

    fn poll_worker(&mut self, ctx: &egui::Context) {
        let events = match &self.worker {
            Some(worker) => worker.poll(),
            None => return,
        };
        let mut finished = false;
        for event in events {
            match event {
                WorkerEvent::Started { device } => self.model.camera_started(&device),
                WorkerEvent::Frame(frame) => {
                    let image = color_image(&frame.image);
                    match &mut self.camera_texture {
                        Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                        None => {
                            self.camera_texture =
                                Some(ctx.load_texture("camera", image, egui::TextureOptions::LINEAR));
                        }
                    }
                    self.live_hud = frame.hud;
                }
                WorkerEvent::Paused(paused) => self.model.camera_paused(paused),
                WorkerEvent::Finished => finished = true,
            }
        }
        if !finished {
            return;
        }

        let Some(worker) = self.worker.take() else {
            return;
        };
        self.camera_texture = None;
        self.live_hud = None;
        match worker.join() {
            Ok(outcome) => {
                self.return_context(outcome.context);
                match outcome.result {
                    Ok(report) => {
                        log::info!("LiveDetectApp: {}", report.summary);
                        self.model
                            .camera_finished(report.summary, report.error.as_ref());
                    }
                    Err(err) => self.model.camera_failed(&err),
                }
            }
            Err(err) => {
                self.model.camera_failed(&err);
                self.rebuild_context();
            }
        }
    }

    fn poll_image_job(&mut self, ctx: &egui::Context) {
        if !self.image_job.as_ref().is_some_and(|job| job.is_finished()) {
            return;
        }
        let Some(job) = self.image_job.take() else {
            return;
        };
        let source = job.path().to_path_buf();
        match job.wait() {
            Ok((context, Ok(outcome))) => {
                self.return_context(context);
                self.model.image_ready(outcome.rendered.len());
                let texture = ctx.load_texture(
                    "result",
                    color_image(&outcome.image),
                    egui::TextureOptions::LINEAR,
                );
                self.result = Some(ResultView {
                    image: outcome.image,
                    source,
                    texture: Some(texture),
                });
            }
            Ok((context, Err(err))) => {
                log::error!("LiveDetectApp: image detection failed: {:#}", err);
                self.return_context(context);
                self.model.image_failed(&err);
            }
            Err(err) => {
                self.model.image_failed(&err);
                self.rebuild_context();
            }
        }
    }

    fn key_commands(&self, ctx: &egui::Context) -> Vec<UiAction> {
        if self.worker.is_none() {
            return Vec::new();
        }
        ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed: true,
                        repeat: false,
                        ..
                    } => key_char(*key),
                    _ => None,
                })
                .filter_map(key_to_command)
                .map(UiAction::Session)
                .collect()
        })
    }

    fn control_panel(&mut self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                let idle = self.model.can_start_work();
                if ui
                    .add_enabled(idle, egui::Button::new("Launch Camera"))
                    .clicked()
                {
                    actions.push(UiAction::LaunchCamera);
                }
                if ui
                    .add_enabled(idle, egui::Button::new("Upload Image"))
                    .clicked()
                {
                    actions.push(UiAction::UploadImage);
                }
                if ui
                    .add_enabled(!self.model.is_picking_color(), egui::Button::new("Pick Person Color"))
                    .clicked()
                {
                    actions.push(UiAction::PickColor);
                }
                let [r, g, b] = self.model.person_color().0;
                let (swatch, _) = ui.allocate_exact_size(egui::vec2(18.0, 18.0), egui::Sense::hover());
                ui.painter()
                    .rect_filled(swatch, 3.0, egui::Color32::from_rgb(r, g, b));
                ui.separator();
                if ui.button("Exit").clicked() {
                    actions.push(UiAction::Exit);
                }
            });
            ui.horizontal(|ui| {
                ui.label("Confidence Threshold");
                let response = ui.add(
                    egui::Slider::new(&mut self.threshold_slider, 0..=100).suffix("%"),
                );
                if response.changed() {
                    actions.push(UiAction::SetThreshold(self.threshold_slider));
                }
            });
            ui.add_space(4.0);
        });
    }

    fn status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            let status = self.model.status();
            let text = egui::RichText::new(status.to_string());
            if status.is_error() {
                ui.label(text.color(egui::Color32::LIGHT_RED));
            } else {
                ui.label(text);
            }
        });
    }

    fn camera_view(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        egui::CentralPanel::default().show(ctx, |ui| {
            match (self.model.mode(), &self.camera_texture) {
                (Mode::CameraRunning { paused, overlay_visible }, Some(texture)) => {
                    ui.horizontal(|ui| {
                        if ui.button(if paused { "Resume (R)" } else { "Pause (R)" }).clicked() {
                            actions.push(UiAction::Session(SessionCommand::TogglePause));
                        }
                        let overlay_label = if overlay_visible {
                            "Hide Overlays (T)"
                        } else {
                            "Show Overlays (T)"
                        };
                        if ui.button(overlay_label).clicked() {
                            actions.push(UiAction::Session(SessionCommand::ToggleOverlay));
                        }
                        if ui.button("Stop (P)").clicked() {
                            actions.push(UiAction::Session(SessionCommand::Exit));
                        }
                        if let Some(hud) = &self.live_hud {
                            ui.label(format!("{:.1} fps", hud.fps));
                        }
                    });
                    show_fitted(ui, texture, ui.available_size());
                }
                (Mode::LaunchingCamera, _) | (Mode::CameraRunning { .. }, None) => {
                    ui.centered_and_justified(|ui| {
                        ui.spinner();
                    });
                }
                _ => {
                    ui.centered_and_justified(|ui| {
                        ui.label("Launch the camera or upload an image to start detecting.");
                    });
                }
            }
        });
    }

    fn result_window(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        let Some(result) = &self.result else {
            return;
        };
        let mut open = true;
        egui::Window::new("Detection Result")
            .open(&mut open)
            .resizable(true)
            .default_size([RESULT_MAX_SIDE, RESULT_MAX_SIDE])
            .show(ctx, |ui| {
                if ui.button("Save Image").clicked() {
                    actions.push(UiAction::SaveResult);
                }
                if let Some(texture) = &result.texture {
                    let available = ui.available_size();
                    let bounds = egui::vec2(
                        available.x.min(RESULT_MAX_SIDE),
                        available.y.min(RESULT_MAX_SIDE),
                    );
                    show_fitted(ui, texture, bounds);
                }
            });
        if !open {
            actions.push(UiAction::CloseResult);
        }
    }

    fn loading_window(&self, ctx: &egui::Context) {
        if self.model.mode() != Mode::ProcessingImage {
            return;
        }
        egui::Window::new("Processing")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Processing image, please wait...");
                });
            });
    }

    fn color_window(&mut self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        if !self.model.is_picking_color() {
            return;
        }
        egui::Window::new("Person Color")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.color_edit_button_srgb(&mut self.picker_color);
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() {
                        actions.push(UiAction::ApplyColor(Some(Rgb(self.picker_color))));
                    }
                    if ui.button("Cancel").clicked() {
                        actions.push(UiAction::ApplyColor(None));
                    }
                });
            });
    }

    fn summary_window(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        let Some(summary) = self.model.summary() else {
            return;
        };
        let mut open = true;
        egui::Window::new("Session Statistics")
            .open(&mut open)
            .collapsible(false)
            .show(ctx, |ui| {
                summary_lines(ui, summary);
                if ui.button("Close").clicked() {
                    actions.push(UiAction::DismissSummary);
                }
            });
        if !open {
            actions.push(UiAction::DismissSummary);
        }
    }
}

impl eframe::App for LiveDetectApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker(ctx);
        self.poll_image_job(ctx);

        let mut actions = self.key_commands(ctx);
        if ctx.input(|input| input.viewport().close_requested()) {
            self.model.request_exit();
            if let Some(worker) = &self.worker {
                worker.stop();
            }
        }

        self.control_panel(ctx, &mut actions);
        self.status_bar(ctx);
        self.camera_view(ctx, &mut actions);
        self.result_window(ctx, &mut actions);
        self.loading_window(ctx);
        self.color_window(ctx, &mut actions);
        self.summary_window(ctx, &mut actions);

        for action in actions {
            self.apply(ctx, action);
        }

        if self.worker.is_some() || self.image_job.is_some() {
            ctx.request_repaint_after(REPAINT_INTERVAL);
        }
    }
}

fn summary_lines(ui: &mut egui::Ui, summary: &SessionSummary) {
    ui.heading("Session Statistics");
    for line in summary.lines() {
        ui.label(line);
    }
}

fn color_image(image: &RgbImage) -> egui::ColorImage {
    egui::ColorImage::from_rgb(
        [image.width() as usize, image.height() as usize],
        image.as_raw(),
    )
}

fn show_fitted(ui: &mut egui::Ui, texture: &egui::TextureHandle, bounds: egui::Vec2) {
    let [width, height] = texture.size();
    let (fit_w, fit_h) = fit_within(
        width as u32,
        height as u32,
        bounds.x.max(1.0) as u32,
        bounds.y.max(1.0) as u32,
    );
    ui.add(
        egui::Image::from_texture(texture)
            .fit_to_exact_size(egui::vec2(fit_w as f32, fit_h as f32)),
    );
}

fn key_char(key: egui::Key) -> Option<char> {
    match key {
        egui::Key::P => Some('p'),
        egui::Key::R => Some('r'),
        egui::Key::T => Some('t'),
        egui::Key::Escape => Some('\u{1b}'),
        _ => None,
    }
}
