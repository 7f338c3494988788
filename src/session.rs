use crate::error::{Error, Result};
use crate::proxy::{HttpProxy, ProxyRpc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 身份提供方，登录成功后给出可调用代理的认证句柄
pub trait IdentityProvider {
    type Handle: ProxyRpc;

    fn login(&self) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// 以预先签发的 token 登录
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    proxy_url: String,
    token: String,
    timeout: Duration,
}

impl TokenIdentity {
    pub fn new(proxy_url: &str, token: &str, timeout: Duration) -> Self {
        Self {
            proxy_url: proxy_url.to_string(),
            token: token.to_string(),
            timeout,
        }
    }
}

impl IdentityProvider for TokenIdentity {
    type Handle = HttpProxy;

    async fn login(&self) -> Result<HttpProxy> {
        HttpProxy::new(&self.proxy_url, &self.token, self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connected,
    /// 登录失败的原因
    Failed(String),
}

/// 持有认证句柄的钱包会话
pub struct Wallet<P: ProxyRpc> {
    actor: Option<Arc<P>>,
    state: SessionState,
}

impl<P: ProxyRpc> Default for Wallet<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProxyRpc> Wallet<P> {
    pub fn new() -> Self {
        Self {
            actor: None,
            state: SessionState::Disconnected,
        }
    }

    pub async fn connect<I>(&mut self, provider: &I) -> Result<()>
    where
        I: IdentityProvider<Handle = P>,
    {
        info!("正在登录代理");
        match provider.login().await {
            Ok(handle) => {
                self.connect_with(handle);
                Ok(())
            }
            Err(e) => {
                self.actor = None;
                self.state = SessionState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// 直接使用已认证的句柄
    pub fn connect_with(&mut self, handle: P) {
        self.actor = Some(Arc::new(handle));
        self.state = SessionState::Connected;
        info!("代理会话已建立");
    }

    pub fn disconnect(&mut self) {
        if self.actor.take().is_some() {
            info!("代理会话已断开");
        }
        self.state = SessionState::Disconnected;
    }

    pub fn connected(&self) -> bool {
        self.actor.is_some()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// 当前认证句柄，未登录时为 `NotConnected`
    pub fn actor(&self) -> Result<Arc<P>> {
        self.actor.clone().ok_or(Error::NotConnected)
    }

    pub fn handle(&self) -> Option<Arc<P>> {
        self.actor.clone()
    }
}
