//! Single-owner arbitration of exclusive interactive resources.
//!
//! An [`Arbiter`] guards one resource, for example "the scheduling dialog".
//! Any number of components register as potential owners; at most one holds
//! the resource at a time. A request from another owner while it is held is
//! not granted. Instead the holder's delegation callback receives the
//! request's payload, so the holder can run its own replace-confirmation
//! flow.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ArbiterError;

type DelegationCallback<P> = Arc<dyn Fn(P) + Send + Sync>;

/// Outcome of [`Arbiter::request_open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenGrant {
    /// The caller holds the resource and may open it.
    Granted,
    /// Another owner holds the resource and has been handed the request.
    /// The caller must not open its own resource.
    Delegated { holder: String },
}

impl OpenGrant {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Observable state of an arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterState {
    Idle,
    Held(String),
}

struct Inner<P> {
    owners: HashMap<String, DelegationCallback<P>>,
    /// Current holder and the payload it was granted with.
    active: Option<(String, P)>,
}

/// Mutual-exclusion registry for one resource with request payload `P`.
///
/// `Clone` is cheap; clones share registrations and state. The internal lock
/// is never held while a delegation callback runs, so callbacks may call
/// back into the arbiter.
pub struct Arbiter<P> {
    name: Arc<str>,
    inner: Arc<Mutex<Inner<P>>>,
}

impl<P> Clone for Arbiter<P> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Clone + Send + 'static> Arbiter<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            inner: Arc::new(Mutex::new(Inner {
                owners: HashMap::new(),
                active: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a potential owner. Does not change the arbiter state.
    ///
    /// `on_delegated_open` is called with the payload of any request made
    /// by another owner while this owner holds the resource.
    ///
    /// # Returns
    ///
    /// A guard that unregisters the owner when dropped, releasing the
    /// resource first if the owner holds it.
    ///
    /// # Errors
    ///
    /// Returns [`ArbiterError::DuplicateOwner`] if `owner_id` is already
    /// registered.
    pub fn register_owner<F>(
        &self,
        owner_id: impl Into<String>,
        on_delegated_open: F,
    ) -> Result<OwnerRegistration<P>, ArbiterError>
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        let owner_id = owner_id.into();
        let mut inner = self.lock();
        if inner.owners.contains_key(&owner_id) {
            return Err(ArbiterError::DuplicateOwner(owner_id));
        }
        inner
            .owners
            .insert(owner_id.clone(), Arc::new(on_delegated_open));
        drop(inner);
        tracing::debug!(arbiter = %self.name, owner = %owner_id, "owner registered");
        Ok(OwnerRegistration {
            arbiter: self.clone(),
            owner_id,
        })
    }

    /// Ask to open the resource on behalf of `owner_id`.
    ///
    /// - Idle: `owner_id` becomes the holder; returns `Granted`.
    /// - Held by `owner_id`: no-op; returns `Granted`. The payload of the
    ///   original grant is kept.
    /// - Held by another owner: the holder's callback receives `payload`;
    ///   returns `Delegated`.
    ///
    /// # Errors
    ///
    /// Returns [`ArbiterError::UnknownOwner`] if `owner_id` is not
    /// registered.
    pub fn request_open(&self, owner_id: &str, payload: P) -> Result<OpenGrant, ArbiterError> {
        let mut inner = self.lock();
        if !inner.owners.contains_key(owner_id) {
            return Err(ArbiterError::UnknownOwner(owner_id.to_owned()));
        }
        let holder = inner.active.as_ref().map(|(holder, _)| holder.clone());
        let holder = match holder {
            None => {
                inner.active = Some((owner_id.to_owned(), payload));
                drop(inner);
                tracing::debug!(arbiter = %self.name, owner = owner_id, "resource granted");
                return Ok(OpenGrant::Granted);
            }
            Some(holder) if holder == owner_id => return Ok(OpenGrant::Granted),
            Some(holder) => holder,
        };
        let callback = inner.owners.get(&holder).cloned();
        drop(inner);

        tracing::debug!(
            arbiter = %self.name,
            owner = owner_id,
            holder = %holder,
            "request delegated to holder"
        );
        if let Some(callback) = callback {
            callback(payload);
        }
        Ok(OpenGrant::Delegated { holder })
    }

    /// Release the resource if `owner_id` holds it. Otherwise does nothing.
    pub fn release(&self, owner_id: &str) {
        let mut inner = self.lock();
        if inner
            .active
            .as_ref()
            .is_some_and(|(holder, _)| holder == owner_id)
        {
            inner.active = None;
            drop(inner);
            tracing::debug!(arbiter = %self.name, owner = owner_id, "resource released");
        }
    }

    pub fn state(&self) -> ArbiterState {
        match &self.lock().active {
            Some((holder, _)) => ArbiterState::Held(holder.clone()),
            None => ArbiterState::Idle,
        }
    }

    /// Payload the current holder was granted with.
    pub fn active_payload(&self) -> Option<P> {
        self.lock().active.as_ref().map(|(_, p)| p.clone())
    }

    fn unregister(&self, owner_id: &str) {
        let mut inner = self.lock();
        inner.owners.remove(owner_id);
        if inner
            .active
            .as_ref()
            .is_some_and(|(holder, _)| holder == owner_id)
        {
            inner.active = None;
        }
        drop(inner);
        tracing::debug!(arbiter = %self.name, owner = owner_id, "owner unregistered");
    }
}

impl<P> fmt::Debug for Arbiter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Arbiter")
            .field("name", &self.name)
            .field("owners", &inner.owners.len())
            .field("holder", &inner.active.as_ref().map(|(h, _)| h))
            .finish()
    }
}

/// Registration of one owner with an [`Arbiter`].
///
/// Dropping the registration (the component unmounting) unregisters the
/// owner and releases the resource if the owner held it.
#[must_use = "the owner is unregistered as soon as the registration is dropped"]
pub struct OwnerRegistration<P: Clone + Send + 'static> {
    arbiter: Arbiter<P>,
    owner_id: String,
}

impl<P: Clone + Send + 'static> OwnerRegistration<P> {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// [`Arbiter::request_open`] for this owner.
    pub fn request_open(&self, payload: P) -> Result<OpenGrant, ArbiterError> {
        self.arbiter.request_open(&self.owner_id, payload)
    }

    /// [`Arbiter::release`] for this owner.
    pub fn release(&self) {
        self.arbiter.release(&self.owner_id);
    }
}

impl<P: Clone + Send + 'static> Drop for OwnerRegistration<P> {
    fn drop(&mut self) {
        self.arbiter.unregister(&self.owner_id);
    }
}

impl<P: Clone + Send + 'static> fmt::Debug for OwnerRegistration<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRegistration")
            .field("arbiter", &self.arbiter.name)
            .field("owner_id", &self.owner_id)
            .finish()
    }
}

/// Arbiters owned by one dashboard session, keyed by resource name and
/// payload type.
#[derive(Clone, Default)]
pub struct ArbiterRegistry {
    arbiters: Arc<Mutex<HashMap<(TypeId, String), Box<dyn Any + Send + Sync>>>>,
}

impl ArbiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The arbiter for `name`, created on first use.
    ///
    /// Arbiters with the same name but different payload types are
    /// distinct.
    pub fn arbiter<P: Clone + Send + 'static>(&self, name: &str) -> Arbiter<P> {
        let key = (TypeId::of::<P>(), name.to_owned());
        let mut arbiters = self.arbiters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = arbiters
            .get(&key)
            .and_then(|boxed| boxed.downcast_ref::<Arbiter<P>>())
        {
            return existing.clone();
        }
        let arbiter = Arbiter::new(name);
        arbiters.insert(key, Box::new(arbiter.clone()));
        arbiter
    }

    pub fn len(&self) -> usize {
        self.arbiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Manual `Debug` because `dyn Any` is not `Debug`.
impl fmt::Debug for ArbiterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArbiterRegistry")
            .field("arbiters", &self.len())
            .finish()
    }
}
