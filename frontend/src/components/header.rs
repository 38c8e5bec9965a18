use yew::prelude::*;

/// Renders the application header
pub fn render_header() -> Html {
    html! {
        <header class="app-header">
            <h1><i class="fa-solid fa-stethoscope"></i> {" Kidney CT Scan Analysis System"}</h1>
            <p class="subtitle">
                {"Upload a CT scan image to classify and detect abnormalities such as Tumor and Stone"}
            </p>
        </header>
    }
}
