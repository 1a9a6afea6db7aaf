//! Name resolution as an external collaborator: `resolve(addr) ->
//! Future<ResolvedAddr>`, optionally skipped entirely.
//!
//! corvid does not perform DNS resolution itself; a
//! [`Bootstrap`](crate::bootstrap::Bootstrap) consults a user-supplied
//! [`NameResolver`] only when one is configured, exactly mirroring Netty's
//! `AddressResolverGroup` plugged into its own `Bootstrap`.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::CoreError;
use crate::promise::Promise;

/// Resolves an address before a client connect, or decides a given address
/// doesn't need resolving (e.g. it's already a numeric `SocketAddr`).
pub trait NameResolver: Send + Sync {
    /// Whether `addr` requires resolution. The default treats every address
    /// as already resolved, since `corvid`'s own `SocketAddr` connect target
    /// carries no unresolved hostname form; a resolver for a richer address
    /// type (e.g. `host:port` strings wrapped upstream) overrides this.
    fn should_resolve(&self, _addr: &SocketAddr) -> bool {
        false
    }

    /// Resolves `addr`, returning a promise that completes with the
    /// concrete address to connect to, or fails the connect attempt.
    fn resolve(&self, addr: SocketAddr) -> Promise<SocketAddr, Arc<CoreError>>;
}

/// A resolver that treats every address as already resolved and completes
/// immediately. The implicit default when a [`Bootstrap`](crate::bootstrap::Bootstrap)
/// has no resolver configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl NameResolver for NoopResolver {
    fn resolve(&self, addr: SocketAddr) -> Promise<SocketAddr, Arc<CoreError>> {
        let promise = Promise::new(Arc::new(crate::promise::ImmediateExecutor));
        let _ = promise.set_success(addr);
        promise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_resolver_completes_synchronously_with_input() {
        let resolver = NoopResolver;
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let promise = resolver.resolve(addr);
        assert!(promise.is_done());
        match promise.sync(None).unwrap() {
            crate::promise::PromiseResult::Success(resolved) => assert_eq!(resolved, addr),
            _ => panic!("expected success"),
        }
    }
}
