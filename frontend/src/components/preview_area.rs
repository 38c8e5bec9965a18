use super::super::{Model, Msg};
use super::utils::debounce;
use yew::prelude::*;

pub fn render_preview_area(model: &Model, ctx: &Context<Model>) -> Html {
    let Some(scan) = &model.scan else {
        return html! {
            <p class="info-message">{"Please upload a CT scan image to begin analysis."}</p>
        };
    };

    let link = ctx.link().clone();

    html! {
        <div id="preview-container">
            <h2>{"Uploaded Image"}</h2>
            <img id="actual-image-preview"
                src={scan.preview_url.to_string()}
                alt={scan.file.name()} />
            <p class="analyzed-filename-display">{ scan.file.name() }</p>
            <div class="button-container">
                <button
                    id="clear-btn"
                    class="analyze-btn"
                    style="background-color: var(--clear-color);"
                    onclick={debounce(300, {
                        let link = link.clone();
                        move || link.send_message(Msg::ClearScan)
                    })}
                >
                    <i class="fa-solid fa-trash"></i>{" Clear"}
                </button>
            </div>
            {
                if model.state.classifying {
                    html! {
                        <div class="loading-preview">
                            <i class="fa-solid fa-spinner fa-spin fa-2x"></i>
                            <p style="margin-left: 10px;">{"Classifying..."}</p>
                        </div>
                    }
                } else {
                    html! {}
                }
            }
        </div>
    }
}
