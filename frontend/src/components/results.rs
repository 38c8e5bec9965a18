use super::super::{Model, Msg};
use super::utils::debounce;
use shared::{guidance_for, ClassificationLabel, MedicalGuidance};
use yew::prelude::*;

pub fn render_results(model: &Model, ctx: &Context<Model>) -> Html {
    let Some(label) = model.state.classification else {
        return html! {};
    };
    let is_normal = label == ClassificationLabel::Normal;

    html! {
        <div class={classes!("results-container", if is_normal { "scan-normal" } else { "scan-abnormal" })}>
            <div class="result-header">
                <h2>{"Classification Result"}</h2>
                {
                    if is_normal {
                        html! { <p class="result-success"><i class="fa-solid fa-circle-check"></i>{" Normal scan detected."}</p> }
                    } else {
                        html! {
                            <p class="result-abnormal">
                                <i class="fa-solid fa-triangle-exclamation"></i>
                                {" Abnormal scan detected: "}<strong>{ label.to_string() }</strong>
                            </p>
                        }
                    }
                }
            </div>
            { render_guidance(guidance_for(label)) }
            { render_detect_button(model, ctx, label) }
        </div>
    }
}

fn render_guidance(guidance: &MedicalGuidance) -> Html {
    let section = |title: &str, text: Option<&'static str>| match text {
        Some(text) => html! { <p><strong>{ format!("{}: ", title) }</strong>{ text }</p> },
        None => html! {},
    };

    html! {
        <div class={classes!("guidance", guidance.severity.css_class())}>
            <h3><i class="fa-solid fa-stethoscope"></i>{" Medical Information"}</h3>
            <p class="guidance-headline"><strong>{ guidance.headline }</strong></p>
            { section("Description", guidance.description) }
            { section("Symptoms", guidance.symptoms) }
            { section("Next Steps", guidance.next_steps) }
            <p><strong>{"Advice:"}</strong></p>
            <ul>
                { for guidance.advice.iter().map(|advice| html! { <li>{ *advice }</li> }) }
            </ul>
        </div>
    }
}

fn render_detect_button(model: &Model, ctx: &Context<Model>, label: ClassificationLabel) -> Html {
    if !label.requires_detection() {
        return html! {};
    }

    let link = ctx.link().clone();
    html! {
        <div class="detection-step">
            <h3><i class="fa-solid fa-magnifying-glass"></i>{" Detection Step"}</h3>
            <button
                id="detect-btn"
                class="analyze-btn"
                style="background-color: var(--primary-color);"
                disabled={model.state.detecting}
                onclick={debounce(300, {
                    let link = link.clone();
                    move || link.send_message(Msg::RequestDetection)
                })}
            >
                {
                    if model.state.detecting {
                        html! { <><i class="fa-solid fa-spinner fa-spin"></i>{" Detecting..."}</> }
                    } else {
                        html! { <><i class="fa-solid fa-crosshairs"></i>{ format!(" Detect {}", label) }</> }
                    }
                }
            </button>
        </div>
    }
}
