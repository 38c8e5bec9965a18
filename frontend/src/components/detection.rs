use super::super::{Model, Msg};
use crate::state::ResultTab;
use super::utils::{detection_line, NO_DETECTIONS_MESSAGE};
use shared::DetectionResponse;
use yew::prelude::*;

pub fn render_detection(model: &Model, ctx: &Context<Model>) -> Html {
    let Some(response) = &model.state.detection else {
        return html! {};
    };
    let link = ctx.link();
    let tab_button = |tab: ResultTab, icon: &'static str, title: &'static str| {
        html! {
            <button
                class={classes!("tab-btn", (model.state.active_tab == tab).then_some("active"))}
                onclick={link.callback(move |_| Msg::SelectTab(tab))}
            >
                <i class={classes!("fa-solid", icon)}></i>{ format!(" {}", title) }
            </button>
        }
    };

    html! {
        <div class="detection-results">
            <h2>{"Detection Results"}</h2>
            <div class="tab-bar">
                { tab_button(ResultTab::Visualization, "fa-image", "Visualization") }
                { tab_button(ResultTab::DetectionInfo, "fa-list", "Detection Info") }
            </div>
            <div class="tab-content">
                {
                    match model.state.active_tab {
                        ResultTab::Visualization => render_visualization(response),
                        ResultTab::DetectionInfo => render_detection_info(model, response),
                    }
                }
            </div>
        </div>
    }
}

fn render_visualization(response: &DetectionResponse) -> Html {
    html! {
        <img id="annotated-image"
            src={response.image_data_url()}
            alt="Detected regions" />
    }
}

fn render_detection_info(model: &Model, response: &DetectionResponse) -> Html {
    if response.detections.is_empty() {
        return html! { <p class="warning-message">{ NO_DETECTIONS_MESSAGE }</p> };
    }

    html! {
        <>
            <h3>{"Detected Regions:"}</h3>
            <ul class="detection-list">
                { for response.detections.iter().map(|detection| html! {
                    <li class="info-message">{ detection_line(detection, model.metadata.as_ref()) }</li>
                }) }
            </ul>
        </>
    }
}
