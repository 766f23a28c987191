//! Stripe client wrapper and the production [`BillingGateway`] implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, CheckoutSessionStatus, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionPaymentIntentData,
    CreateCheckoutSessionSubscriptionData, Customer, CustomerId, Expandable, ListCheckoutSessions,
    ListCustomers, ListSubscriptions, Subscription, SubscriptionId,
    SubscriptionStatus as StripeSubStatus, SubscriptionStatusFilter, UpdateSubscription,
};

use pomo_shared::SubscriptionStatus;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{
    BillingGateway, CheckoutMode, CheckoutSessionView, CustomerView, NewCheckoutSession,
    PaymentStatus, SubscriptionView, UID_METADATA_KEY,
};

/// Stripe configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    pub portal_return_url: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: require_env("STRIPE_SECRET_KEY")?,
            webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            success_url: std::env::var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
                "https://pomodorotimer.vip/?checkout=success&session_id={CHECKOUT_SESSION_ID}"
                    .to_string()
            }),
            cancel_url: std::env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "https://pomodorotimer.vip/?checkout=canceled".to_string()),
            portal_return_url: std::env::var("PORTAL_RETURN_URL")
                .unwrap_or_else(|_| "https://pomodorotimer.vip/".to_string()),
        })
    }
}

fn require_env(name: &str) -> BillingResult<String> {
    std::env::var(name).map_err(|_| BillingError::Config(format!("{} must be set", name)))
}

/// Stripe API client, created once per process and shared.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self { client, config }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

fn expandable_id<T: stripe::Object>(expandable: &Expandable<T>) -> String
where
    T::Id: ToString,
{
    match expandable {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(object) => object.id().to_string(),
    }
}

fn canonical_status(status: StripeSubStatus) -> SubscriptionStatus {
    match status {
        StripeSubStatus::Active => SubscriptionStatus::Active,
        StripeSubStatus::Trialing => SubscriptionStatus::Trialing,
        StripeSubStatus::PastDue => SubscriptionStatus::PastDue,
        StripeSubStatus::Canceled => SubscriptionStatus::Canceled,
        // No access and no canonical meaning for these.
        StripeSubStatus::Unpaid
        | StripeSubStatus::Incomplete
        | StripeSubStatus::IncompleteExpired
        | StripeSubStatus::Paused => SubscriptionStatus::None,
    }
}

fn subscription_view(subscription: &Subscription) -> SubscriptionView {
    let price_id = subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string());

    SubscriptionView {
        id: subscription.id.to_string(),
        status: canonical_status(subscription.status),
        price_id,
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
        customer_id: Some(expandable_id(&subscription.customer)),
        uid: subscription.metadata.get(UID_METADATA_KEY).cloned(),
    }
}

fn checkout_view(session: &CheckoutSession) -> CheckoutSessionView {
    let mode = match session.mode {
        CheckoutSessionMode::Subscription => CheckoutMode::Subscription,
        CheckoutSessionMode::Payment => CheckoutMode::Payment,
        CheckoutSessionMode::Setup => CheckoutMode::Setup,
    };
    let payment_status = match session.payment_status {
        CheckoutSessionPaymentStatus::Paid => PaymentStatus::Paid,
        CheckoutSessionPaymentStatus::Unpaid => PaymentStatus::Unpaid,
        CheckoutSessionPaymentStatus::NoPaymentRequired => PaymentStatus::NoPaymentRequired,
    };

    CheckoutSessionView {
        id: session.id.to_string(),
        mode,
        client_reference_id: session.client_reference_id.clone(),
        subscription_id: session.subscription.as_ref().map(expandable_id),
        payment_intent_id: session.payment_intent.as_ref().map(expandable_id),
        customer_id: session.customer.as_ref().map(expandable_id),
        payment_status,
        complete: matches!(session.status, Some(CheckoutSessionStatus::Complete)),
        url: session.url.clone(),
    }
}

#[async_trait]
impl BillingGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> BillingResult<CheckoutSessionView> {
        let metadata: HashMap<String, String> =
            HashMap::from([(UID_METADATA_KEY.to_string(), params.uid.clone())]);

        let mut create = CreateCheckoutSession::new();
        create.success_url = Some(&params.success_url);
        create.cancel_url = Some(&params.cancel_url);
        create.client_reference_id = Some(&params.uid);
        create.customer_email = params.customer_email.as_deref();
        create.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        match params.mode {
            CheckoutMode::Subscription => {
                create.mode = Some(CheckoutSessionMode::Subscription);
                create.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
                    trial_period_days: params.trial_period_days,
                    metadata: Some(metadata),
                    ..Default::default()
                });
            }
            CheckoutMode::Payment => {
                create.mode = Some(CheckoutSessionMode::Payment);
                create.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
                    metadata: Some(metadata),
                    ..Default::default()
                });
            }
            CheckoutMode::Setup => {
                return Err(BillingError::InvalidArgument(
                    "setup mode is not supported".to_string(),
                ));
            }
        }

        let session = CheckoutSession::create(self.inner(), create).await?;
        Ok(checkout_view(&session))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> BillingResult<CheckoutSessionView> {
        let session_id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|_| BillingError::InvalidArgument(format!("invalid checkout session id: {session_id}")))?;
        let session = CheckoutSession::retrieve(self.inner(), &session_id, &[]).await?;
        Ok(checkout_view(&session))
    }

    async fn recent_checkout_sessions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> BillingResult<Vec<CheckoutSessionView>> {
        let mut params = ListCheckoutSessions::new();
        params.customer = Some(
            customer_id
                .parse::<CustomerId>()
                .map_err(|_| BillingError::InvalidArgument(format!("invalid customer id: {customer_id}")))?,
        );
        params.limit = Some(limit);

        let sessions = CheckoutSession::list(self.inner(), &params).await?;
        Ok(sessions.data.iter().map(checkout_view).collect())
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionView> {
        let subscription_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|_| BillingError::InvalidArgument(format!("invalid subscription id: {subscription_id}")))?;
        let subscription = Subscription::retrieve(self.inner(), &subscription_id, &[]).await?;
        Ok(subscription_view(&subscription))
    }

    async fn latest_subscription_for_customer(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<SubscriptionView>> {
        let mut params = ListSubscriptions::new();
        params.customer = Some(
            customer_id
                .parse::<CustomerId>()
                .map_err(|_| BillingError::InvalidArgument(format!("invalid customer id: {customer_id}")))?,
        );
        params.status = Some(SubscriptionStatusFilter::All);
        params.limit = Some(1);

        let subscriptions = Subscription::list(self.inner(), &params).await?;
        Ok(subscriptions.data.first().map(subscription_view))
    }

    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<CustomerView>> {
        let mut params = ListCustomers::new();
        params.email = Some(email);
        params.limit = Some(1);

        let customers = Customer::list(self.inner(), &params).await?;
        Ok(customers.data.first().map(|customer| CustomerView {
            id: customer.id.to_string(),
            email: customer.email.clone(),
        }))
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> BillingResult<SubscriptionView> {
        let subscription_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|_| BillingError::InvalidArgument(format!("invalid subscription id: {subscription_id}")))?;
        let subscription = Subscription::update(
            self.inner(),
            &subscription_id,
            UpdateSubscription {
                cancel_at_period_end: Some(cancel),
                ..Default::default()
            },
        )
        .await?;
        Ok(subscription_view(&subscription))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> BillingResult<String> {
        let customer = customer_id
            .parse::<CustomerId>()
            .map_err(|_| BillingError::InvalidArgument(format!("invalid customer id: {customer_id}")))?;
        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(self.inner(), params).await?;
        Ok(session.url)
    }
}
