//! 本地密钥存储
//!
//! 凭证以 `apiKey -> Credential` 的 JSON 对象整体保存在命名空间 [`NAMESPACE`] 下，
//! 每次变更立即落盘。secret 以明文保存，见 [`KeyStore`] 的说明。

use crate::error::{Error, Result};
use crate::exchange::ExchangeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const NAMESPACE: &str = "trendlens.keys";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
    /// 仅 OKX 需要
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    pub exchange: ExchangeId,
}

impl Credential {
    pub fn new(
        exchange: ExchangeId,
        api_key: &str,
        secret_key: &str,
        passphrase: Option<&str>,
    ) -> Self {
        Self {
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            passphrase: passphrase.map(|p| p.to_string()),
            exchange,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::InvalidCredential("empty api key".to_string()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(Error::InvalidCredential("empty secret".to_string()));
        }
        if self.exchange == ExchangeId::Okx
            && self.passphrase.as_deref().is_none_or(|p| p.is_empty())
        {
            return Err(Error::InvalidCredential(
                "Okx credential requires a passphrase".to_string(),
            ));
        }
        Ok(())
    }
}

// secret 与 passphrase 不进入日志
impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &self.api_key)
            .field("secret_key", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("exchange", &self.exchange)
            .finish()
    }
}

/// 按命名空间读写整段文本的持久化后端
pub trait Storage: Send {
    fn read(&self, namespace: &str) -> Result<Option<String>>;
    fn write(&self, namespace: &str, contents: &str) -> Result<()>;
}

/// 每个命名空间对应目录下的一个 `<namespace>.json` 文件
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }
}

impl Storage for FileStorage {
    fn read(&self, namespace: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(namespace)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, namespace: &str, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(namespace), contents)?;
        Ok(())
    }
}

/// 进程内存储，克隆后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.records
            .lock()
            .map_err(|_| Error::Storage("memory storage poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn read(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self.records()?.get(namespace).cloned())
    }

    fn write(&self, namespace: &str, contents: &str) -> Result<()> {
        self.records()?
            .insert(namespace.to_string(), contents.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyStoreEvent {
    Loaded { count: usize },
    Added { exchange: ExchangeId, api_key: String },
    Removed { api_key: String },
}

/// 凭证缓存与持久化
///
/// 注意：secret 不做任何加密，以明文形式写入存储后端。
/// 能读取存储目录的任何人都能拿到全部交易所密钥。
pub struct KeyStore<S: Storage> {
    storage: S,
    cache: BTreeMap<String, Credential>,
    loaded: bool,
    events: broadcast::Sender<KeyStoreEvent>,
}

pub type SharedKeyStore<S> = Arc<Mutex<KeyStore<S>>>;

/// 获取共享存储的锁，仅在单次操作期间持有
pub fn lock<S: Storage>(store: &SharedKeyStore<S>) -> Result<MutexGuard<'_, KeyStore<S>>> {
    store
        .lock()
        .map_err(|_| Error::Storage("key store lock poisoned".to_string()))
}

impl<S: Storage> KeyStore<S> {
    pub fn new(storage: S) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            storage,
            cache: BTreeMap::new(),
            loaded: false,
            events,
        }
    }

    pub fn shared(self) -> SharedKeyStore<S> {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyStoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: KeyStoreEvent) {
        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }

    fn ensure_loaded(&mut self) {
        if !self.loaded && self.cache.is_empty() {
            self.load();
        }
    }

    /// 线性查找，返回第一个匹配的凭证
    pub fn get_by_exchange(&mut self, exchange: ExchangeId) -> Option<Credential> {
        self.ensure_loaded();
        self.cache
            .values()
            .find(|c| c.exchange == exchange)
            .cloned()
    }

    pub fn credentials(&mut self) -> Vec<Credential> {
        self.ensure_loaded();
        self.cache.values().cloned().collect()
    }

    /// 每个交易所只保留一组凭证，重复添加返回 `CredentialExists`；
    /// api key 是存储键，已被其他凭证占用时返回 `ApiKeyExists`
    pub fn add(&mut self, credential: Credential) -> Result<()> {
        credential.validate()?;
        self.ensure_loaded();

        if self.cache.values().any(|c| c.exchange == credential.exchange) {
            return Err(Error::CredentialExists(credential.exchange));
        }
        if self.cache.contains_key(&credential.api_key)
            || self.cache.values().any(|c| c.api_key == credential.api_key)
        {
            return Err(Error::ApiKeyExists(credential.api_key));
        }

        let exchange = credential.exchange;
        let api_key = credential.api_key.clone();
        let mut next = self.cache.clone();
        next.insert(api_key.clone(), credential);
        self.commit(next)?;

        info!("已添加 {} 凭证 {}", exchange, api_key);
        self.notify(KeyStoreEvent::Added { exchange, api_key });
        Ok(())
    }

    /// 删除所有该 api key 的凭证，返回删除数量
    pub fn remove(&mut self, api_key: &str) -> Result<usize> {
        self.ensure_loaded();
        let mut next = self.cache.clone();
        next.retain(|_, c| c.api_key != api_key);
        let removed = self.cache.len() - next.len();
        self.commit(next)?;

        if removed > 0 {
            info!("已删除凭证 {}", api_key);
            self.notify(KeyStoreEvent::Removed {
                api_key: api_key.to_string(),
            });
        }
        Ok(removed)
    }

    /// 先落盘再替换缓存，写入失败时缓存保持不变
    fn commit(&mut self, next: BTreeMap<String, Credential>) -> Result<()> {
        Self::persist(&self.storage, &next)?;
        self.cache = next;
        Ok(())
    }

    fn persist(storage: &S, cache: &BTreeMap<String, Credential>) -> Result<()> {
        let contents = serde_json::to_string(cache)?;
        storage.write(NAMESPACE, &contents)
    }

    pub fn save(&self) -> Result<()> {
        Self::persist(&self.storage, &self.cache)
    }

    /// 读取存储，记录缺失或损坏时不报错，存储保持为空
    pub fn load(&mut self) {
        self.loaded = true;
        self.cache.clear();

        let contents = match self.storage.read(NAMESPACE) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!("{} 尚无记录", NAMESPACE);
                self.notify(KeyStoreEvent::Loaded { count: 0 });
                return;
            }
            Err(e) => {
                warn!("读取 {} 失败: {}", NAMESPACE, e);
                self.notify(KeyStoreEvent::Loaded { count: 0 });
                return;
            }
        };

        match serde_json::from_str::<BTreeMap<String, Credential>>(&contents) {
            Ok(cache) => self.cache = cache,
            Err(e) => warn!("{} 记录损坏，忽略: {}", NAMESPACE, e),
        }

        debug!("已加载 {} 组凭证", self.cache.len());
        self.notify(KeyStoreEvent::Loaded {
            count: self.cache.len(),
        });
    }
}
