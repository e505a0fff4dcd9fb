use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::handler::{
    handler_key, GenericHttpHandler, HandlerKind, LlsdHandler, PollHandler, RegisteredHandler,
    StreamHandler, XmlRpcHandler,
};

type Table = RwLock<HashMap<String, RegisteredHandler>>;

/// The HandlerRegistry maps request keys to the handler that serves them.
///
/// Each handler kind owns its own table behind its own lock, so a burst of
/// registrations in one table never stalls lookups in another.
///
/// ## Resolution
/// Exact keys win. Otherwise the longest registered key that is a literal
/// string prefix of the request key is chosen. A key of bare `/` is only
/// ever matched by the path `/` itself.
#[derive(Default)]
pub struct HandlerRegistry {
    stream: Table,
    stream_http: Table,
    generic: Table,
    xmlrpc: Table,
    llsd: Table,
    poll: Table,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: HandlerKind) -> &Table {
        match kind {
            HandlerKind::Stream => &self.stream,
            HandlerKind::StreamHttp => &self.stream_http,
            HandlerKind::GenericHttp => &self.generic,
            HandlerKind::XmlRpc => &self.xmlrpc,
            HandlerKind::Llsd => &self.llsd,
            HandlerKind::Poll => &self.poll,
        }
    }

    /// Registers `handler` under `key` in the table of its kind.
    ///
    /// Path-keyed kinds return `false` and leave the table untouched when the
    /// key is taken. XML-RPC and LLSD registrations always succeed and replace
    /// any previous handler.
    pub fn register(&self, key: impl Into<String>, handler: RegisteredHandler) -> bool {
        let kind = handler.kind();
        let key = key.into();
        let mut table = self.table(kind).write();

        if kind.rejects_collisions() && table.contains_key(&key) {
            tracing::debug!("Registry: {:?} key {} already registered", kind, key);
            return false;
        }
        table.insert(key, handler);
        true
    }

    /// Removes `key` from the table of `kind`. Unknown keys are ignored.
    pub fn unregister(&self, kind: HandlerKind, key: &str) -> Option<RegisteredHandler> {
        self.table(kind).write().remove(key)
    }

    pub fn resolve_exact(&self, kind: HandlerKind, key: &str) -> Option<RegisteredHandler> {
        self.table(kind).read().get(key).cloned()
    }

    pub fn resolve_prefix(&self, kind: HandlerKind, path: &str) -> Option<RegisteredHandler> {
        let table = self.table(kind).read();
        if let Some(handler) = table.get(path) {
            return Some(handler.clone());
        }
        best_prefix(table.keys().map(String::as_str), path).and_then(|key| table.get(key).cloned())
    }

    /// Whether a handler other than the bare root one would serve `path`.
    pub fn has_path_handler(&self, kind: HandlerKind, path: &str) -> bool {
        if path == "/" {
            return false;
        }
        let table = self.table(kind).read();
        table.contains_key(path) || best_prefix(table.keys().map(String::as_str), path).is_some()
    }

    pub fn len(&self, kind: HandlerKind) -> usize {
        self.table(kind).read().len()
    }

    pub fn is_empty(&self) -> bool {
        HandlerKind::ALL.iter().all(|kind| self.len(*kind) == 0)
    }

    /// Kinds that currently have at least one registration.
    pub fn kinds(&self) -> Vec<HandlerKind> {
        HandlerKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.len(*kind) > 0)
            .collect()
    }

    pub fn keys(&self, kind: HandlerKind) -> Vec<String> {
        let mut keys: Vec<String> = self.table(kind).read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Adds a stream handler under `VERB:path`. Returns `false` if one exists.
    pub fn add_stream_handler(&self, handler: Arc<dyn StreamHandler>) -> bool {
        let key = handler_key(handler.http_method(), handler.path());
        self.register(key, RegisteredHandler::Stream(handler))
    }

    pub fn remove_stream_handler(&self, http_method: &str, path: &str) {
        self.unregister(HandlerKind::Stream, &handler_key(http_method, path));
    }

    /// Adds a stream handler under its bare path, ignoring its verb. These are
    /// the last resort of form and query requests before the 404 page.
    pub fn add_stream_http_handler(&self, handler: Arc<dyn StreamHandler>) -> bool {
        let key = handler.path().to_string();
        self.register(key, RegisteredHandler::StreamHttp(handler))
    }

    pub fn remove_stream_http_handler(&self, path: &str) {
        self.unregister(HandlerKind::StreamHttp, path);
    }

    pub fn stream_http_handler(&self, key: &str) -> Option<Arc<dyn StreamHandler>> {
        match self.resolve_prefix(HandlerKind::StreamHttp, key)? {
            RegisteredHandler::StreamHttp(handler) => Some(handler),
            _ => None,
        }
    }

    /// `key` is either a path or a method name carried in the `method` field.
    pub fn add_http_handler(&self, key: impl Into<String>, handler: GenericHttpHandler) -> bool {
        self.register(key, RegisteredHandler::GenericHttp(handler))
    }

    /// An empty `http_method` removes the bare path key.
    pub fn remove_http_handler(&self, http_method: &str, path: &str) {
        if http_method.is_empty() {
            self.unregister(HandlerKind::GenericHttp, path);
        } else {
            self.unregister(HandlerKind::GenericHttp, &handler_key(http_method, path));
        }
    }

    pub fn add_xmlrpc_handler(&self, method: impl Into<String>, handler: XmlRpcHandler) -> bool {
        self.register(method, RegisteredHandler::XmlRpc(handler))
    }

    pub fn add_xmlrpc_handler_with_keep_alive(
        &self,
        method: impl Into<String>,
        handler: XmlRpcHandler,
        keep_alive: bool,
    ) -> bool {
        self.add_xmlrpc_handler(method, handler.with_keep_alive(keep_alive))
    }

    pub fn remove_xmlrpc_handler(&self, method: &str) {
        self.unregister(HandlerKind::XmlRpc, method);
    }

    pub fn xmlrpc_handler(&self, method: &str) -> Option<XmlRpcHandler> {
        match self.resolve_exact(HandlerKind::XmlRpc, method)? {
            RegisteredHandler::XmlRpc(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn add_llsd_handler(&self, path: impl Into<String>, handler: LlsdHandler) -> bool {
        self.register(path, RegisteredHandler::Llsd(handler))
    }

    /// Removes the LLSD handler at `path` only if it is `handler` itself.
    pub fn remove_llsd_handler(&self, path: &str, handler: &LlsdHandler) -> bool {
        let mut table = self.llsd.write();
        match table.get(path) {
            Some(RegisteredHandler::Llsd(current)) if current.ptr_eq(handler) => {
                table.remove(path);
                true
            }
            _ => false,
        }
    }

    pub fn llsd_handler(&self, path: &str) -> Option<LlsdHandler> {
        match self.resolve_prefix(HandlerKind::Llsd, path)? {
            RegisteredHandler::Llsd(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn add_poll_handler(&self, path: impl Into<String>, handler: PollHandler) -> bool {
        self.register(path, RegisteredHandler::Poll(handler))
    }

    pub fn remove_poll_handler(&self, path: &str) {
        self.unregister(HandlerKind::Poll, path);
    }

    /// Poll paths match exactly; a path nested under a poll path is not a poll.
    pub fn poll_handler(&self, path: &str) -> Option<PollHandler> {
        match self.resolve_exact(HandlerKind::Poll, path)? {
            RegisteredHandler::Poll(handler) => Some(handler),
            _ => None,
        }
    }
}

/// Longest key that is a literal prefix of `path`. Bare `/` only matches `/`.
///
/// Distinct keys of equal length cannot both prefix the same string, so the
/// result never depends on iteration order.
fn best_prefix<'a>(keys: impl Iterator<Item = &'a str>, path: &str) -> Option<&'a str> {
    keys.filter(|key| !key.is_empty())
        .filter(|key| path.starts_with(*key))
        .filter(|key| *key != "/" || path == "/")
        .max_by_key(|key| key.len())
}

#[cfg(test)]
mod tests {
    use super::best_prefix;

    #[test]
    fn best_prefix_prefers_longest() {
        let keys = ["/a", "/a/b", "/a/b/c", "/z"];
        assert_eq!(best_prefix(keys.iter().copied(), "/a/b/cd"), Some("/a/b/c"));
        assert_eq!(best_prefix(keys.iter().copied(), "/a/bx"), Some("/a/b"));
        assert_eq!(best_prefix(keys.iter().copied(), "/q"), None);
    }

    #[test]
    fn bare_root_only_matches_itself() {
        let keys = ["/"];
        assert_eq!(best_prefix(keys.iter().copied(), "/"), Some("/"));
        assert_eq!(best_prefix(keys.iter().copied(), "/x"), None);
    }
}
