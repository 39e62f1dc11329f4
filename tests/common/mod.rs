#![allow(dead_code)]

use freight_market::billing::{
    BillingSettings, CheckoutRequest, CheckoutSession, PaymentGateway, PaymentStatus,
};
use freight_market::directory::StoredDirectory;
use freight_market::model::{Offer, OfferKind, Request, RequestDraft};
use freight_market::negotiation::TransitionPolicy;
use freight_market::notify::NotificationOutbox;
use freight_market::store::Store;
use freight_market::types::{Amount, Role, UserProfile};
use freight_market::{Collaborators, Marketplace};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Payment provider double: records every checkout and answers status
/// queries with whatever the test set last.
pub struct FakeGateway {
    pub requests: Mutex<Vec<CheckoutRequest>>,
    pub fail: AtomicBool,
    status: Mutex<PaymentStatus>,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            status: Mutex::new(PaymentStatus::Pending),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: PaymentStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl PaymentGateway for FakeGateway {
    fn create_session(&self, request: &CheckoutRequest) -> anyhow::Result<CheckoutSession> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("provider unavailable");
        }
        self.requests.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutSession {
            session_id: format!("cs_test_{n}"),
            url: format!("https://checkout.test/cs_test_{n}"),
        })
    }

    fn session_status(&self, _session_id: &str) -> anyhow::Result<PaymentStatus> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("provider unavailable");
        }
        Ok(*self.status.lock().unwrap())
    }
}

/// One marketplace over its own temporary sled database.
pub struct Harness {
    // keeps the database directory alive for the test
    _temp_dir: TempDir,
    pub market: Marketplace,
    pub directory: StoredDirectory,
    pub outbox: NotificationOutbox,
    pub gateway: Arc<FakeGateway>,
}

impl Harness {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        Self::with_policy(name, TransitionPolicy::Permissive)
    }

    pub fn with_policy(name: &str, policy: TransitionPolicy) -> anyhow::Result<Self> {
        // sled locks the database directory, so every test gets its own
        let temp_dir = tempfile::tempdir()?;
        let store = Store::open(temp_dir.path().join(format!("{name}.db")))?;

        let directory = StoredDirectory::new(store.clone());
        let outbox = NotificationOutbox::new(store.clone());
        let gateway = Arc::new(FakeGateway::new());

        let collaborators = Collaborators {
            directory: Arc::new(directory.clone()),
            notifier: Arc::new(outbox.clone()),
            gateway: gateway.clone(),
        };
        let market = Marketplace::new(store, collaborators, policy, BillingSettings::default());

        Ok(Self {
            _temp_dir: temp_dir,
            market,
            directory,
            outbox,
            gateway,
        })
    }

    pub fn client(&self, name: &str) -> anyhow::Result<UserProfile> {
        Ok(self.directory.register(name, &[Role::Client])?)
    }

    pub fn transporter(&self, name: &str) -> anyhow::Result<UserProfile> {
        Ok(self.directory.register(name, &[Role::Transporter])?)
    }

    pub fn admin(&self, name: &str) -> anyhow::Result<UserProfile> {
        Ok(self.directory.register(name, &[Role::Admin])?)
    }

    pub fn post_request(&self, client: &UserProfile, title: &str) -> anyhow::Result<Request> {
        Ok(self
            .market
            .negotiation()
            .create_request(&client.id, draft(title, Amount::from_minor(50_000)))?)
    }

    pub fn bid(
        &self,
        request: &Request,
        transporter: &UserProfile,
        minor: i64,
    ) -> anyhow::Result<Offer> {
        Ok(self.market.negotiation().submit_offer(
            &request.id,
            &transporter.id,
            Amount::from_minor(minor),
            None,
            OfferKind::Offer,
        )?)
    }
}

pub fn draft(title: &str, price: Amount) -> RequestDraft {
    RequestDraft {
        title: title.to_string(),
        description: "Palés de fruta refrigerada".to_string(),
        origin: "Valencia".to_string(),
        destination: "Madrid".to_string(),
        cargo_type: "refrigerado".to_string(),
        offered_price: price,
    }
}
