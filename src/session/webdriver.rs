//! WebDriver-backed implementation of the session capability.

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::session::{Element, Session, Target};

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
];

const CHROME_VERSIONS: &[&str] = &["129.0.0.0", "130.0.0.0", "131.0.0.0"];

/// Pick a plausible desktop Chrome user agent at random, one per session.
pub fn random_user_agent() -> String {
    let mut rng = rand::rng();
    let platform = PLATFORMS[rng.random_range(0..PLATFORMS.len())];
    let version = CHROME_VERSIONS[rng.random_range(0..CHROME_VERSIONS.len())];
    format!(
        "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"
    )
}

/// One browser session driven over the WebDriver protocol.
///
/// The client lives in an `Option` so that `close` can hand ownership to
/// fantoccini; afterwards every call fails with [`SessionError::Closed`].
pub struct WebDriverSession {
    client: Option<Client>,
}

impl WebDriverSession {
    /// Connect to a WebDriver endpoint and open a fresh session with a
    /// randomized user agent.
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self, SessionError> {
        let user_agent = random_user_agent();
        debug!("session user agent: {user_agent}");

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
            "--disable-gpu".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }

        let mut capabilities = serde_json::Map::new();
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(webdriver_url)
            .await?;
        info!("webdriver session opened against {webdriver_url}");

        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut Client, SessionError> {
        self.client.as_mut().ok_or(SessionError::Closed)
    }

    fn locator<'a>(target: &'a Target) -> Locator<'a> {
        match target {
            Target::Css(s) => Locator::Css(s),
            Target::XPath(s) => Locator::XPath(s),
        }
    }

    // Get Element Attribute returns the href as written in the markup,
    // which for listing anchors is relative. The href *property* is the
    // browser-resolved absolute URL, so that is what goes in the snapshot.
    async fn snapshot(element: fantoccini::elements::Element) -> Result<Element, SessionError> {
        let text = element.text().await?;
        let href = element.prop("href").await?;
        let src = element.prop("src").await?;
        Ok(Element { text, href, src })
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.client()?.goto(url).await?;
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String, SessionError> {
        let url = self.client()?.current_url().await?;
        Ok(url.to_string())
    }

    async fn page_content(&mut self) -> Result<String, SessionError> {
        Ok(self.client()?.source().await?)
    }

    async fn find_element(&mut self, target: &Target) -> Result<Element, SessionError> {
        match self.client()?.find(Self::locator(target)).await {
            Ok(element) => Self::snapshot(element).await,
            Err(e) if e.is_no_such_element() => {
                Err(SessionError::ElementNotFound(target.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_elements(&mut self, target: &Target) -> Result<Vec<Element>, SessionError> {
        let found = self.client()?.find_all(Self::locator(target)).await?;
        let mut elements = Vec::with_capacity(found.len());
        for element in found {
            elements.push(Self::snapshot(element).await?);
        }
        Ok(elements)
    }

    async fn click(&mut self, target: &Target) -> Result<(), SessionError> {
        match self.client()?.find(Self::locator(target)).await {
            Ok(element) => {
                element.click().await?;
                Ok(())
            }
            Err(e) if e.is_no_such_element() => {
                Err(SessionError::ElementNotFound(target.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError> {
        Ok(self.client()?.execute(script, args).await?)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.client.take() {
            Some(client) => {
                client.close().await?;
                info!("webdriver session closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
