//! Publish surface driven over the DevTools protocol.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::cdp::CdpClient;
use crate::config::PublishConfig;
use crate::pipeline::PublishSurface;
use crate::{Error, Result};

/// Opens a publish surface on a session endpoint.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn PublishSurface>>;
}

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Embed `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn submittable_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  const style = window.getComputedStyle(el);
  const visible = !!style && style.display !== 'none' && style.visibility !== 'hidden' && el.offsetHeight > 0;
  const enabled = el.getAttribute('data-loading') === 'false' && el.getAttribute('aria-disabled') === 'false';
  return visible && enabled;
}})()"#,
        sel = js_string(selector)
    )
}

fn click_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.scrollIntoView({{ block: 'center' }});
  el.click();
  return true;
}})()"#,
        sel = js_string(selector)
    )
}

fn present_script(selector: &str) -> String {
    format!("!!document.querySelector({})", js_string(selector))
}

/// Publish surface bound to the first page of a remote browser.
pub struct CdpPublishSurface {
    client: CdpClient,
    session_id: String,
    config: PublishConfig,
}

impl CdpPublishSurface {
    /// Connect, attach to the first page and navigate it to the upload page.
    pub async fn open(endpoint: &str, config: PublishConfig) -> Result<Self> {
        let client = CdpClient::connect(endpoint, CALL_TIMEOUT).await?;

        let targets = client.call("Target.getTargets", json!({}), None).await?;
        let target_id = targets["targetInfos"]
            .as_array()
            .and_then(|infos| infos.iter().find(|t| t["type"] == "page"))
            .and_then(|t| t["targetId"].as_str())
            .ok_or_else(|| Error::publish("remote browser has no open page"))?
            .to_string();

        let attached = client
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| Error::publish("attach returned no session id"))?
            .to_string();

        let mut surface = Self {
            client,
            session_id,
            config,
        };
        surface.call("Page.enable", json!({})).await?;
        surface.reset().await?;
        Ok(surface)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.client
            .call(method, params, Some(&self.session_id))
            .await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let response = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
            )
            .await?;

        if let Some(exception) = response.get("exceptionDetails") {
            return Err(Error::publish(format!(
                "script failed: {}",
                exception["text"].as_str().unwrap_or("exception")
            )));
        }
        Ok(response["result"]["value"].clone())
    }

    async fn evaluate_bool(&self, expression: &str) -> Result<bool> {
        Ok(self.evaluate(expression).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl PublishSurface for CdpPublishSurface {
    async fn inject_file(&mut self, path: &Path) -> Result<()> {
        let absolute = std::path::absolute(path)?;
        if !tokio::fs::try_exists(&absolute).await? {
            return Err(Error::publish(format!(
                "artifact {} does not exist",
                absolute.display()
            )));
        }

        let document = self.call("DOM.getDocument", json!({ "depth": 0 })).await?;
        let root = document["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| Error::publish("document has no root node"))?;

        let found = self
            .call(
                "DOM.querySelector",
                json!({ "nodeId": root, "selector": self.config.file_input_selector }),
            )
            .await?;
        let node_id = found["nodeId"].as_i64().unwrap_or(0);
        if node_id == 0 {
            return Err(Error::publish("file input not found on page"));
        }

        self.call(
            "DOM.setFileInputFiles",
            json!({ "nodeId": node_id, "files": [absolute.to_string_lossy()] }),
        )
        .await?;
        debug!(file = %absolute.display(), "File attached to upload input");
        Ok(())
    }

    async fn is_submittable(&mut self) -> Result<bool> {
        self.evaluate_bool(&submittable_script(&self.config.submit_selector))
            .await
    }

    async fn submit(&mut self) -> Result<()> {
        if self
            .evaluate_bool(&click_script(&self.config.submit_selector))
            .await?
        {
            Ok(())
        } else {
            Err(Error::publish("submit control disappeared before click"))
        }
    }

    async fn is_published(&mut self) -> Result<bool> {
        let href = self.evaluate("window.location.href").await?;
        Ok(href
            .as_str()
            .is_some_and(|h| h.contains(&self.config.success_url_fragment)))
    }

    async fn reset(&mut self) -> Result<()> {
        self.call("Page.navigate", json!({ "url": self.config.upload_url }))
            .await?;

        let script = present_script(&self.config.file_input_selector);
        let polls = self.config.reset_polls();
        for _ in 0..polls {
            // Evaluation fails while the new document is still loading.
            if let Ok(true) = self.evaluate_bool(&script).await {
                return Ok(());
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
        Err(Error::publish(format!(
            "file input did not appear after {} checks",
            polls
        )))
    }
}

/// Opens [`CdpPublishSurface`]s with a shared configuration.
pub struct CdpSurfaceFactory {
    config: PublishConfig,
}

impl CdpSurfaceFactory {
    pub fn new(config: PublishConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SurfaceFactory for CdpSurfaceFactory {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn PublishSurface>> {
        let open = CdpPublishSurface::open(endpoint, self.config.clone());
        let surface = tokio::time::timeout(self.config.reset_timeout() + CALL_TIMEOUT, open)
            .await
            .map_err(|_| Error::publish("opening publish surface timed out"))??;
        Ok(Box::new(surface))
    }
}
