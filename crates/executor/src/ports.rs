//! Browser port
//!
//! The executor never talks to a real browser directly; it drives this trait.
//! Adapters implement it over a live automation session, and the simulated
//! implementation here backs tests and dry runs with an in-memory page.

use async_trait::async_trait;
use replay_core_types::{FrameDescriptor, LocatorBundle, NodeId, PageModel};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum PortError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("element is no longer attached: {0:?}")]
    Detached(NodeId),
    #[error("action rejected: {0}")]
    Rejected(String),
}

/// Full address of an element across nested documents: the iframe chain and
/// shadow-host path leading to its document, plus the node id within that
/// document's arena. A bare [`NodeId`] is only meaningful relative to one
/// arena, so every port action carries one of these instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementHandle {
    /// Iframe hops from the top-level document, outermost first.
    pub iframe_chain: Vec<FrameDescriptor>,
    /// Shadow hosts crossed after the last iframe hop.
    pub shadow_hosts: Vec<String>,
    pub node: NodeId,
}

impl ElementHandle {
    /// Element living in the top-level document.
    pub fn top(node: NodeId) -> Self {
        Self {
            iframe_chain: Vec::new(),
            shadow_hosts: Vec::new(),
            node,
        }
    }

    /// Element living in the document the bundle's recorded chains lead to.
    pub fn for_bundle(bundle: &LocatorBundle, node: NodeId) -> Self {
        Self {
            iframe_chain: bundle.iframe_chain.clone().unwrap_or_default(),
            shadow_hosts: bundle.shadow_hosts.clone().unwrap_or_default(),
            node,
        }
    }

    /// The document this handle addresses within `page`: iframe hops first,
    /// then shadow hosts. `None` when a hop is no longer attached.
    pub fn document<'a>(&self, page: &'a PageModel) -> Option<&'a PageModel> {
        let mut root = page;
        for descriptor in &self.iframe_chain {
            root = root.find_frame(descriptor)?;
        }
        for host in &self.shadow_hosts {
            root = root.find_shadow_root(host)?;
        }
        Some(root)
    }

    /// Mutable counterpart of [`document`](Self::document).
    pub fn document_mut<'a>(&self, page: &'a mut PageModel) -> Option<&'a mut PageModel> {
        let mut root = page;
        for descriptor in &self.iframe_chain {
            root = root.find_frame_mut(descriptor)?;
        }
        for host in &self.shadow_hosts {
            root = root.find_shadow_root_mut(host)?;
        }
        Some(root)
    }
}

/// Minimal surface the executor needs from a browser.
#[async_trait]
pub trait BrowserPort: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PortError>;

    /// Current document as a searchable tree. Called once per resolution
    /// cycle, so implementations should keep it reasonably cheap.
    async fn snapshot(&self) -> PageModel;

    async fn click(&self, target: &ElementHandle) -> Result<(), PortError>;

    /// Replace the element's current value with `text`.
    async fn type_text(&self, target: &ElementHandle, text: &str) -> Result<(), PortError>;

    /// Choose the option whose value is `value`.
    async fn select_option(&self, target: &ElementHandle, value: &str) -> Result<(), PortError>;

    async fn set_checked(&self, target: &ElementHandle, checked: bool) -> Result<(), PortError>;

    /// Replace a contenteditable region's text.
    async fn set_content(&self, target: &ElementHandle, text: &str) -> Result<(), PortError>;

    async fn press_enter(&self, target: &ElementHandle) -> Result<(), PortError>;
}

/// Everything a port was asked to do, in order. Node ids are relative to the
/// document the action's handle addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchedAction {
    Navigate(String),
    Click(NodeId),
    TypeText { node: NodeId, text: String },
    SelectOption { node: NodeId, value: String },
    SetChecked { node: NodeId, checked: bool },
    SetContent { node: NodeId, text: String },
    PressEnter(NodeId),
}

struct SimState {
    page: PageModel,
    routes: BTreeMap<String, PageModel>,
    actions: Vec<DispatchedAction>,
    reject_actions: bool,
}

/// In-memory [`BrowserPort`] for tests and dry runs.
///
/// Actions mutate the held page where that makes sense (typed text lands in
/// the `value` attribute, checkboxes toggle `checked`) and every dispatch is
/// recorded for assertions.
pub struct SimulatedBrowser {
    state: Mutex<SimState>,
}

impl SimulatedBrowser {
    pub fn new(page: PageModel) -> Self {
        Self {
            state: Mutex::new(SimState {
                page,
                routes: BTreeMap::new(),
                actions: Vec::new(),
                reject_actions: false,
            }),
        }
    }

    pub fn empty() -> Self {
        Self::new(PageModel::new("about:blank"))
    }

    /// Serve `page` when `url` is navigated to.
    pub fn route(&self, url: impl Into<String>, page: PageModel) {
        self.state.lock().unwrap().routes.insert(url.into(), page);
    }

    /// Replace the current document outright.
    pub fn load(&self, page: PageModel) {
        self.state.lock().unwrap().page = page;
    }

    /// Make every subsequent action dispatch fail.
    pub fn reject_actions(&self, reject: bool) {
        self.state.lock().unwrap().reject_actions = reject;
    }

    pub fn actions(&self) -> Vec<DispatchedAction> {
        self.state.lock().unwrap().actions.clone()
    }

    fn dispatch(&self, target: &ElementHandle, action: DispatchedAction) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_actions {
            return Err(PortError::Rejected(format!("{:?}", action)));
        }
        let Some(document) = target.document_mut(&mut state.page) else {
            return Err(PortError::Detached(target.node));
        };
        if target.node.0 >= document.len() {
            return Err(PortError::Detached(target.node));
        }
        apply_to_page(document, &action);
        debug!(?action, "simulated dispatch");
        state.actions.push(action);
        Ok(())
    }
}

fn apply_to_page(page: &mut PageModel, action: &DispatchedAction) {
    match action {
        DispatchedAction::TypeText { node, text } => {
            page.node_mut(*node)
                .attributes
                .insert("value".to_string(), text.clone());
        }
        DispatchedAction::SelectOption { node, value } => {
            page.node_mut(*node)
                .attributes
                .insert("value".to_string(), value.clone());
        }
        DispatchedAction::SetChecked { node, checked } => {
            let attrs = &mut page.node_mut(*node).attributes;
            if *checked {
                attrs.insert("checked".to_string(), "true".to_string());
            } else {
                attrs.remove("checked");
            }
        }
        DispatchedAction::SetContent { node, text } => {
            page.node_mut(*node).text = Some(text.clone());
        }
        _ => {}
    }
}

#[async_trait]
impl BrowserPort for SimulatedBrowser {
    async fn navigate(&self, url: &str) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_actions {
            return Err(PortError::Navigation(url.to_string()));
        }
        match state.routes.get(url) {
            Some(page) => state.page = page.clone(),
            None => state.page.url = url.to_string(),
        }
        state.actions.push(DispatchedAction::Navigate(url.to_string()));
        Ok(())
    }

    async fn snapshot(&self) -> PageModel {
        self.state.lock().unwrap().page.clone()
    }

    async fn click(&self, target: &ElementHandle) -> Result<(), PortError> {
        self.dispatch(target, DispatchedAction::Click(target.node))
    }

    async fn type_text(&self, target: &ElementHandle, text: &str) -> Result<(), PortError> {
        self.dispatch(
            target,
            DispatchedAction::TypeText {
                node: target.node,
                text: text.to_string(),
            },
        )
    }

    async fn select_option(&self, target: &ElementHandle, value: &str) -> Result<(), PortError> {
        self.dispatch(
            target,
            DispatchedAction::SelectOption {
                node: target.node,
                value: value.to_string(),
            },
        )
    }

    async fn set_checked(&self, target: &ElementHandle, checked: bool) -> Result<(), PortError> {
        self.dispatch(
            target,
            DispatchedAction::SetChecked {
                node: target.node,
                checked,
            },
        )
    }

    async fn set_content(&self, target: &ElementHandle, text: &str) -> Result<(), PortError> {
        self.dispatch(
            target,
            DispatchedAction::SetContent {
                node: target.node,
                text: text.to_string(),
            },
        )
    }

    async fn press_enter(&self, target: &ElementHandle) -> Result<(), PortError> {
        self.dispatch(target, DispatchedAction::PressEnter(target.node))
    }
}
