//! Scripted session used by unit tests. No browser involved: elements,
//! page content, and script results are whatever the test installs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SessionError;
use crate::session::{Element, Session, Target};

type ScriptHandler = Box<dyn FnMut(&str, &[Value]) -> Value + Send>;

#[derive(Default)]
pub struct MockSession {
    pub visited: Vec<String>,
    pub page: String,
    elements: HashMap<String, Vec<Element>>,
    pub clicks: Vec<String>,
    script_handler: Option<ScriptHandler>,
    pub closed: bool,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = page.into();
        self
    }

    pub fn with_element(mut self, target: &Target, element: Element) -> Self {
        self.elements
            .entry(target.to_string())
            .or_default()
            .push(element);
        self
    }

    pub fn with_text_element(self, target: &Target, text: impl Into<String>) -> Self {
        self.with_element(
            target,
            Element {
                text: text.into(),
                ..Element::default()
            },
        )
    }

    pub fn with_script_handler(
        mut self,
        handler: impl FnMut(&str, &[Value]) -> Value + Send + 'static,
    ) -> Self {
        self.script_handler = Some(Box::new(handler));
        self
    }
}

#[async_trait]
impl Session for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.visited.push(url.to_string());
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String, SessionError> {
        Ok(self
            .visited
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_content(&mut self) -> Result<String, SessionError> {
        Ok(self.page.clone())
    }

    async fn find_element(&mut self, target: &Target) -> Result<Element, SessionError> {
        self.elements
            .get(&target.to_string())
            .and_then(|matches| matches.first())
            .cloned()
            .ok_or_else(|| SessionError::ElementNotFound(target.to_string()))
    }

    async fn find_elements(&mut self, target: &Target) -> Result<Vec<Element>, SessionError> {
        Ok(self
            .elements
            .get(&target.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&mut self, target: &Target) -> Result<(), SessionError> {
        if !self.elements.contains_key(&target.to_string()) {
            return Err(SessionError::ElementNotFound(target.to_string()));
        }
        self.clicks.push(target.to_string());
        Ok(())
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError> {
        match self.script_handler.as_mut() {
            Some(handler) => Ok(handler(script, &args)),
            None => Ok(Value::Null),
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        Ok(())
    }
}
