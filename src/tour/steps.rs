use minijinja::Environment;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bridge::{DocumentBridge, DomBridge};
use crate::config::TourConfig;
use crate::store::CompletionFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopoverPosition {
    Top,
    Bottom,
    Left,
    Right,
    Center,
}

/// The single engine capability handed to interactive step content.
#[derive(Clone)]
pub struct TourControls {
    close: Arc<dyn Fn() + Send + Sync>,
}

impl TourControls {
    pub fn new(close: impl Fn() + Send + Sync + 'static) -> Self {
        Self { close: Arc::new(close) }
    }

    pub fn close(&self) {
        (self.close)()
    }
}

#[derive(Clone)]
pub struct EmbeddedAction {
    pub label: String,
    run: Arc<dyn Fn() + Send + Sync>,
}

impl EmbeddedAction {
    pub fn new(label: &str, run: impl Fn() + Send + Sync + 'static) -> Self {
        Self { label: label.to_string(), run: Arc::new(run) }
    }

    pub fn run(&self) {
        (self.run)()
    }
}

#[derive(Clone)]
pub struct StepBody {
    pub text: String,
    pub action: Option<EmbeddedAction>,
}

pub type ContentProducer = Arc<dyn Fn(&TourControls) -> StepBody + Send + Sync>;

#[derive(Clone)]
pub enum StepContent {
    Static(String),
    Interactive(ContentProducer),
}

#[derive(Clone)]
pub struct TourStep {
    pub target: String,
    pub content: StepContent,
    pub position: PopoverPosition,
}

impl TourStep {
    pub fn body(&self, controls: &TourControls) -> StepBody {
        match &self.content {
            StepContent::Static(text) => StepBody { text: text.clone(), action: None },
            StepContent::Interactive(produce) => produce(controls),
        }
    }
}

/// What the overlay needs to draw one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub index: usize,
    pub target: String,
    pub selector: String,
    pub position: PopoverPosition,
    pub text: String,
    pub action_label: Option<String>,
}

/// Everything the catalog's content may reach besides the engine.
#[derive(Clone)]
pub struct StepEnv {
    pub flag: CompletionFlag,
    pub bridge: DocumentBridge,
    pub config: Arc<TourConfig>,
}

/// Builds the catalog. Called for every tour instantiation so the embedded
/// action never holds on to a previous session's controls.
pub fn get_steps(env: &StepEnv) -> Vec<TourStep> {
    let targets = &env.config.targets;
    let start_chatting = {
        let env = env.clone();
        Arc::new(move |controls: &TourControls| {
            let controls = controls.clone();
            let env = env.clone();
            StepBody {
                text: "This is your AI assistant. Ask about {{ example_topic }}, or try: \"{{ seed_phrase }}\"".to_string(),
                action: Some(EmbeddedAction::new("Start chatting", move || {
                    controls.close();
                    env.flag.set();
                    let bridge = env.bridge.clone();
                    let seed_phrase = env.config.seed_phrase.clone();
                    let message_input = env.config.targets.message_input.clone();
                    let delay = env.config.seed_delay();
                    actix_rt::spawn(async move {
                        actix_rt::time::sleep(delay).await;
                        seed_chat_input(&bridge, &message_input, &seed_phrase);
                    });
                })),
            }
        }) as ContentProducer
    };

    vec![
        TourStep {
            target: targets.dock_toggle.clone(),
            content: StepContent::Static(
                "Step {{ step_number }} of {{ step_count }}: open the chat dock from here.".to_string(),
            ),
            position: PopoverPosition::Top,
        },
        TourStep {
            target: targets.ai_menu_entry.clone(),
            content: StepContent::Static(
                "Step {{ step_number }} of {{ step_count }}: pick the AI assistant to start a conversation.".to_string(),
            ),
            position: PopoverPosition::Left,
        },
        TourStep {
            target: targets.chat_popup.clone(),
            content: StepContent::Interactive(start_chatting),
            position: PopoverPosition::Left,
        },
    ]
}

/// Focuses the chat input and seeds it, never over text the viewer typed.
pub fn seed_chat_input<B: DomBridge>(bridge: &B, message_input: &str, seed_phrase: &str) -> bool {
    let Some(input) = bridge.find(message_input) else {
        return false;
    };
    bridge.focus(input);
    bridge.set_value_if_empty(input, seed_phrase)
}

pub fn render_views(steps: &[TourStep], controls: &TourControls, config: &TourConfig) -> Vec<StepView> {
    let env = Environment::new();
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let body = step.body(controls);
            let ctx = minijinja::context! {
                step_number => index + 1,
                step_count => steps.len(),
                seed_phrase => config.seed_phrase.as_str(),
                example_topic => "appointments, billing or prescription templates",
            };
            let text = env.render_str(&body.text, ctx).unwrap_or_else(|e| {
                log::warn!("Could not render the copy for step {}: {}", index, e);
                body.text.clone()
            });
            StepView {
                index,
                target: step.target.clone(),
                selector: config.selector(&step.target),
                position: step.position,
                text,
                action_label: body.action.map(|a| a.label),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::document::{lock, Document};
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PAGE: &str = r#"<html><body>
        <section data-tour="chat-popup"><textarea data-tour="message-input"></textarea></section>
    </body></html>"#;

    fn env(config: TourConfig) -> StepEnv {
        let config = Arc::new(config);
        let document = Document::from_html(PAGE, &config.tour_attribute).unwrap().shared();
        StepEnv {
            flag: CompletionFlag::new(Arc::new(MemoryStore::new()), &config.completion_key),
            bridge: DocumentBridge::new(document, config.clone()),
            config,
        }
    }

    #[test]
    fn test_default_catalog_shape() {
        let steps = get_steps(&env(TourConfig::default()));
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].target, "chat-dock-toggle");
        assert_eq!(steps[1].target, "ai-menu-entry");
        assert_eq!(steps[2].target, "chat-popup");
        assert!(matches!(steps[0].content, StepContent::Static(_)));
        assert!(matches!(steps[2].content, StepContent::Interactive(_)));
    }

    #[test]
    fn test_views_render_templates() {
        let steps = get_steps(&env(TourConfig::default()));
        let controls = TourControls::new(|| {});
        let views = render_views(&steps, &controls, &TourConfig::default());
        assert_eq!(views[0].text, "Step 1 of 3: open the chat dock from here.");
        assert_eq!(views[0].selector, "[data-tour=\"chat-dock-toggle\"]");
        assert_eq!(views[0].position, PopoverPosition::Top);
        assert!(views[2].text.contains(&TourConfig::default().seed_phrase));
        assert_eq!(views[2].action_label.as_deref(), Some("Start chatting"));
        assert!(views[1].action_label.is_none());
    }

    #[actix_rt::test]
    async fn test_start_chatting_closes_sets_flag_and_seeds() {
        let config = TourConfig { seed_delay_ms: 5, ..TourConfig::default() };
        let env = env(config);
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = closes.clone();
        let controls = TourControls::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let steps = get_steps(&env);
        let action = steps[2].body(&controls).action.unwrap();
        action.run();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(env.flag.is_set());

        actix_rt::time::sleep(Duration::from_millis(50)).await;
        let document = lock(env.bridge.document());
        let input = document.find("message-input").unwrap();
        assert_eq!(document.value_of(input).unwrap(), env.config.seed_phrase);
        assert_eq!(document.focused(), Some(input));
    }

    #[test]
    fn test_seed_never_overwrites() {
        let env = env(TourConfig::default());
        {
            let mut document = lock(env.bridge.document());
            let input = document.find("message-input").unwrap();
            document.set_value(input, "my own question");
        }
        assert!(!seed_chat_input(&env.bridge, "message-input", "seed"));
        let document = lock(env.bridge.document());
        let input = document.find("message-input").unwrap();
        assert_eq!(document.value_of(input).unwrap(), "my own question");
        assert_eq!(document.focused(), Some(input));
    }

    #[test]
    fn test_seed_without_input_is_noop() {
        let env = env(TourConfig::default());
        assert!(!seed_chat_input(&env.bridge, "nowhere", "seed"));
    }
}
