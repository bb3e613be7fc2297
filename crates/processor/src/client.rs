use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use trailfund_domain::config::ProcessorConfig;
use trailfund_domain::processor::{
    AccountSnapshot, ChargeSnapshot, CreatePaymentIntent, CreatePrice, CreateRefund,
    CreateSubscription, PaymentIntent, PaymentMetadata, PaymentProcessor, Price, PriceInterval,
    ProcessorError, ProcessorResult, Refund, SubscriptionHandle, TransferSnapshot,
};

use crate::types::{
    AccountDto, ApiErrorBody, ChargeDto, CustomerDto, CustomerListDto, IntentDto, InvoiceDto,
    PriceDto, ProductDto, RefundDto, SubscriptionDto, TransferDto,
};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
/// Scopes a request to a connected account's object namespace.
const ACCOUNT_HEADER: &str = "Processor-Account";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MISSING_CODE: &str = "resource_missing";

/// `PaymentProcessor` implementation over the processor's HTTPS API:
/// form-encoded bodies, bearer auth, idempotency keys as headers.
pub struct HttpProcessor {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self, ProcessorError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ProcessorError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_url().trim_end_matches('/').to_string(),
            secret_key: config.secret_key().to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        missing: (&'static str, &str),
    ) -> ProcessorResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|err| ProcessorError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| ProcessorError::Transport(err.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or_default();
        debug!(%status, code = error.code.as_deref(), "processor call failed");

        if status == StatusCode::NOT_FOUND || error.code.as_deref() == Some(MISSING_CODE) {
            let (resource, id) = missing;
            return Err(ProcessorError::missing(resource, id));
        }
        Err(ProcessorError::Api {
            code: error.code,
            message: error
                .message
                .unwrap_or_else(|| format!("request failed with status {status}")),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
        missing: (&'static str, &str),
    ) -> ProcessorResult<T> {
        let mut builder = self.request(Method::POST, path).form(params);
        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        self.send(builder, missing).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        on_account: Option<&str>,
        missing: (&'static str, &str),
    ) -> ProcessorResult<T> {
        let mut builder = self.request(Method::GET, path).query(query);
        if let Some(account) = on_account {
            builder = builder.header(ACCOUNT_HEADER, account);
        }
        self.send(builder, missing).await
    }
}

fn pair(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn metadata_params(metadata: PaymentMetadata) -> Vec<(String, String)> {
    metadata
        .to_pairs()
        .into_iter()
        .map(|(key, value)| (format!("metadata[{key}]"), value))
        .collect()
}

#[async_trait]
impl PaymentProcessor for HttpProcessor {
    async fn ensure_customer(&self, email: &str) -> ProcessorResult<String> {
        let existing: CustomerListDto = self
            .get(
                "/v1/customers",
                &[("email", email), ("limit", "1")],
                None,
                ("customer", email),
            )
            .await?;
        if let Some(customer) = existing.data.into_iter().next() {
            return Ok(customer.id);
        }

        let created: CustomerDto = self
            .post_form(
                "/v1/customers",
                &[pair("email", email)],
                None,
                ("customer", email),
            )
            .await?;
        Ok(created.id)
    }

    async fn retrieve_account(&self, account_id: &str) -> ProcessorResult<AccountSnapshot> {
        let dto: AccountDto = self
            .get(
                &format!("/v1/accounts/{account_id}"),
                &[],
                None,
                ("account", account_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn create_product(&self, name: &str) -> ProcessorResult<String> {
        let dto: ProductDto = self
            .post_form(
                "/v1/products",
                &[pair("name", name)],
                None,
                ("product", name),
            )
            .await?;
        Ok(dto.id)
    }

    async fn create_price(&self, request: CreatePrice) -> ProcessorResult<Price> {
        let mut params = vec![
            pair("product", &request.product_id),
            pair("unit_amount", request.amount_minor),
            pair("currency", &request.currency),
        ];
        if let Some(interval) = request.interval {
            let interval = match interval {
                PriceInterval::Month => "month",
                PriceInterval::Year => "year",
            };
            params.push(pair("recurring[interval]", interval));
        }
        let dto: PriceDto = self
            .post_form(
                "/v1/prices",
                &params,
                None,
                ("product", &request.product_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn set_default_price(&self, product_id: &str, price_id: &str) -> ProcessorResult<()> {
        let _: ProductDto = self
            .post_form(
                &format!("/v1/products/{product_id}"),
                &[pair("default_price", price_id)],
                None,
                ("product", product_id),
            )
            .await?;
        Ok(())
    }

    async fn archive_price(&self, price_id: &str) -> ProcessorResult<()> {
        let _: PriceDto = self
            .post_form(
                &format!("/v1/prices/{price_id}"),
                &[pair("active", "false")],
                None,
                ("price", price_id),
            )
            .await?;
        Ok(())
    }

    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntent,
    ) -> ProcessorResult<PaymentIntent> {
        let mut params = vec![
            pair("amount", request.amount_minor),
            pair("currency", &request.currency),
            pair("customer", &request.customer_id),
            pair("payment_method", &request.payment_method_id),
            pair("application_fee_amount", request.application_fee_minor),
            pair("transfer_data[destination]", &request.destination_account),
        ];
        params.extend(metadata_params(request.metadata));
        let dto: IntentDto = self
            .post_form(
                "/v1/payment_intents",
                &params,
                Some(&request.idempotency_key),
                ("customer", &request.customer_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        let dto: IntentDto = self
            .get(
                &format!("/v1/payment_intents/{intent_id}"),
                &[],
                None,
                ("payment_intent", intent_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn attach_intent_metadata(
        &self,
        intent_id: &str,
        metadata: PaymentMetadata,
    ) -> ProcessorResult<()> {
        let _: IntentDto = self
            .post_form(
                &format!("/v1/payment_intents/{intent_id}"),
                &metadata_params(metadata),
                None,
                ("payment_intent", intent_id),
            )
            .await?;
        Ok(())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscription,
    ) -> ProcessorResult<SubscriptionHandle> {
        let params = vec![
            pair("customer", &request.customer_id),
            pair("items[0][price]", &request.price_id),
            pair("default_payment_method", &request.payment_method_id),
            pair("application_fee_percent", request.application_fee_percent),
            pair("transfer_data[destination]", &request.destination_account),
            // An initial failed charge must not abort creation; the client
            // confirms the invoice's intent afterwards.
            pair("payment_behavior", "allow_incomplete"),
        ];
        let dto: SubscriptionDto = self
            .post_form(
                "/v1/subscriptions",
                &params,
                Some(&request.idempotency_key),
                ("price", &request.price_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn retrieve_invoice_intent(&self, invoice_id: &str) -> ProcessorResult<PaymentIntent> {
        let invoice: InvoiceDto = self
            .get(
                &format!("/v1/invoices/{invoice_id}"),
                &[],
                None,
                ("invoice", invoice_id),
            )
            .await?;
        let intent_id = invoice
            .payment_intent
            .ok_or_else(|| ProcessorError::missing("payment_intent", invoice_id))?;
        self.retrieve_payment_intent(&intent_id).await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> ProcessorResult<()> {
        let builder = self
            .request(Method::DELETE, &format!("/v1/subscriptions/{subscription_id}"));
        let _: SubscriptionDto = self
            .send(builder, ("subscription", subscription_id))
            .await?;
        Ok(())
    }

    async fn retrieve_charge(
        &self,
        charge_id: &str,
        on_account: Option<&str>,
    ) -> ProcessorResult<ChargeSnapshot> {
        let dto: ChargeDto = self
            .get(
                &format!("/v1/charges/{charge_id}"),
                &[],
                on_account,
                ("charge", charge_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn retrieve_transfer(&self, transfer_id: &str) -> ProcessorResult<TransferSnapshot> {
        let dto: TransferDto = self
            .get(
                &format!("/v1/transfers/{transfer_id}"),
                &[],
                None,
                ("transfer", transfer_id),
            )
            .await?;
        Ok(dto.into())
    }

    async fn create_refund(&self, request: CreateRefund) -> ProcessorResult<Refund> {
        let mut params = vec![
            pair("charge", &request.charge_id),
            pair("reverse_transfer", request.reverse_transfer),
            pair("refund_application_fee", request.refund_application_fee),
        ];
        if let Some(reason) = &request.reason {
            params.push(pair("reason", reason));
        }
        let dto: RefundDto = self
            .post_form("/v1/refunds", &params, None, ("charge", &request.charge_id))
            .await?;
        Ok(Refund { id: dto.id })
    }
}
