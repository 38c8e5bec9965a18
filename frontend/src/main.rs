mod api;
mod components;
mod state;

use components::detection::render_detection;
use components::handlers;
use components::header::render_header;
use components::preview_area::render_preview_area;
use components::results::render_results;
use components::theme_toggle::render_theme_toggle;
use components::upload_section::render_upload_section;
use components::utils::{render_error_message, Theme};
use gloo_file::{File as GlooFile, ObjectUrl};
use shared::{ClassificationLabel, DetectionResponse, ModelMetadata};
use state::{ResultTab, ScanState};
use web_sys::DragEvent;
use yew::prelude::*;

pub struct ScanData {
    pub file: GlooFile,
    pub preview_url: ObjectUrl,
}

pub enum Msg {
    // Scan lifecycle
    ScanSelected(GlooFile),
    ClearScan,

    // Requests
    ClassificationLoaded(u64, ClassificationLabel),
    RequestDetection,
    MetadataLoaded(ModelMetadata),
    DetectionLoaded(u64, DetectionResponse),
    RequestFailed(u64, String),

    // UI states
    SetError(Option<String>),
    SetDragging(bool),
    SelectTab(ResultTab),
    ToggleTheme,

    // Input events
    HandleDrop(DragEvent),
}

pub struct Model {
    scan: Option<ScanData>,
    state: ScanState,
    metadata: Option<ModelMetadata>,
    is_dragging: bool,
    theme: Theme,
}

impl Component for Model {
    type Message = Msg;
    type Properties = ();

    fn create(_ctx: &Context<Self>) -> Self {
        let theme = Theme::load();
        theme.apply();

        Self {
            scan: None,
            state: ScanState::default(),
            metadata: None,
            is_dragging: false,
            theme,
        }
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            Msg::ScanSelected(file) => handlers::handle_scan_selected(self, ctx, file),
            Msg::ClearScan => handlers::handle_clear_scan(self),

            Msg::ClassificationLoaded(scan_id, label) => self.state.classified(scan_id, label),
            Msg::RequestDetection => handlers::handle_request_detection(self, ctx),
            Msg::MetadataLoaded(metadata) => {
                handlers::handle_metadata_loaded(self, ctx, metadata)
            }
            Msg::DetectionLoaded(scan_id, response) => {
                handlers::handle_detection_loaded(self, scan_id, response)
            }
            Msg::RequestFailed(scan_id, error) => self.state.failed(scan_id, error),

            Msg::SetError(error) => {
                self.state.show_error(error);
                true
            }
            Msg::SetDragging(is_dragging) => {
                self.is_dragging = is_dragging;
                true
            }
            Msg::SelectTab(tab) => self.state.select_tab(tab),
            Msg::ToggleTheme => handlers::handle_toggle_theme(self),

            Msg::HandleDrop(event) => handlers::handle_drop(self, ctx, event),
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        html! {
            <div class="container">
                { render_header() }
                <div class="top-right">
                    { render_theme_toggle(self.theme, ctx.link()) }
                </div>

                <main class="main-content">
                    { render_upload_section(self, ctx) }
                    { render_error_message(self) }
                    { render_preview_area(self, ctx) }
                    { render_results(self, ctx) }
                    { render_detection(self, ctx) }
                </main>

                <footer class="app-footer">
                    <p>{"Kidney CT Triage | Fullstack Rust WASM | Not a substitute for medical advice"}</p>
                </footer>
            </div>
        }
    }
}

fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Dashboard starting...");
    yew::Renderer::<Model>::new().render();
}
