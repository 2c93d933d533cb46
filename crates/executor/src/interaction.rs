//! Interaction classification
//!
//! The same recorded event means different things on different controls: an
//! `input` on a select picks an option, on a checkbox it sets the checked
//! state, on a text field it types. Classification happens on the resolved
//! element at act time, not at record time, so a control that changed kind
//! since recording still gets the right dispatch.

use crate::ports::{BrowserPort, ElementHandle, PortError};
use replay_core_types::ElementNode;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    TextInput,
    TextArea,
    Select,
    ContentEditable,
    Checkbox,
    Generic,
}

/// Decide how to drive the resolved element.
pub fn classify(element: &ElementNode) -> InteractionKind {
    if element.content_editable {
        return InteractionKind::ContentEditable;
    }
    match element.tag.as_str() {
        "textarea" => InteractionKind::TextArea,
        "select" => InteractionKind::Select,
        "input" => match element.attr("type") {
            Some("checkbox") | Some("radio") => InteractionKind::Checkbox,
            _ => InteractionKind::TextInput,
        },
        _ => InteractionKind::Generic,
    }
}

/// Apply a recorded `input` value to the element.
pub async fn apply_input(
    port: &dyn BrowserPort,
    kind: InteractionKind,
    target: &ElementHandle,
    value: &str,
) -> Result<(), PortError> {
    debug!(?kind, value, "applying input");
    match kind {
        InteractionKind::TextInput | InteractionKind::TextArea | InteractionKind::Generic => {
            port.type_text(target, value).await
        }
        InteractionKind::Select => port.select_option(target, value).await,
        InteractionKind::ContentEditable => port.set_content(target, value).await,
        InteractionKind::Checkbox => port.set_checked(target, is_truthy(value)).await,
    }
}

/// Apply a recorded `click` to the element. Checkboxes toggle rather than
/// receive a raw click so the resulting state is deterministic in the
/// simulated port too.
pub async fn apply_click(
    port: &dyn BrowserPort,
    kind: InteractionKind,
    target: &ElementHandle,
    element: &ElementNode,
) -> Result<(), PortError> {
    match kind {
        InteractionKind::Checkbox => {
            let checked = element.attr("checked").is_some();
            port.set_checked(target, !checked).await
        }
        _ => port.click(target).await,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes" | "checked"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{DispatchedAction, SimulatedBrowser};
    use replay_core_types::PageModel;

    #[test]
    fn classification_covers_the_control_kinds() {
        assert_eq!(classify(&ElementNode::new("textarea")), InteractionKind::TextArea);
        assert_eq!(classify(&ElementNode::new("select")), InteractionKind::Select);
        assert_eq!(classify(&ElementNode::new("input")), InteractionKind::TextInput);
        assert_eq!(
            classify(&ElementNode::new("input").with_attr("type", "checkbox")),
            InteractionKind::Checkbox
        );
        assert_eq!(
            classify(&ElementNode::new("input").with_attr("type", "email")),
            InteractionKind::TextInput
        );
        assert_eq!(
            classify(&ElementNode::new("div").editable()),
            InteractionKind::ContentEditable
        );
        assert_eq!(classify(&ElementNode::new("button")), InteractionKind::Generic);
    }

    #[tokio::test]
    async fn input_dispatch_matches_kind() {
        let mut page = PageModel::new("https://example.com");
        let select = page.append_root(ElementNode::new("select").with_id("country"));
        let checkbox = page.append_root(
            ElementNode::new("input")
                .with_id("agree")
                .with_attr("type", "checkbox"),
        );
        let browser = SimulatedBrowser::new(page);

        apply_input(&browser, InteractionKind::Select, &ElementHandle::top(select), "se")
            .await
            .unwrap();
        apply_input(
            &browser,
            InteractionKind::Checkbox,
            &ElementHandle::top(checkbox),
            "true",
        )
        .await
        .unwrap();

        assert_eq!(
            browser.actions(),
            vec![
                DispatchedAction::SelectOption {
                    node: select,
                    value: "se".to_string()
                },
                DispatchedAction::SetChecked {
                    node: checkbox,
                    checked: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn clicking_a_checkbox_toggles() {
        let mut page = PageModel::new("https://example.com");
        let element = ElementNode::new("input")
            .with_attr("type", "checkbox")
            .with_attr("checked", "true");
        let checkbox = page.append_root(element.clone());
        let browser = SimulatedBrowser::new(page);

        apply_click(
            &browser,
            InteractionKind::Checkbox,
            &ElementHandle::top(checkbox),
            &element,
        )
        .await
        .unwrap();

        assert_eq!(
            browser.actions(),
            vec![DispatchedAction::SetChecked {
                node: checkbox,
                checked: false
            }]
        );
    }
}
