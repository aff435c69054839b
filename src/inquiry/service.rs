use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::context::Context;
use crate::error::StoreError;

use super::entity::Stock;
use super::repo::InquiryRepo;

/// Asset inquiry use cases exposed to the surrounding application.
#[async_trait]
pub trait Service: Send + Sync {
    /// Net amount of gold held; zero when none was ever booked.
    ///
    /// # Errors
    /// Repository errors are returned unchanged.
    async fn inquiry_asset_gold(&self, ctx: &Context) -> Result<Decimal, StoreError>;

    /// Open stock positions.
    ///
    /// # Errors
    /// Repository errors are returned unchanged.
    async fn inquiry_stocks(&self, ctx: &Context) -> Result<Vec<Stock>, StoreError>;
}

pub struct AssetInquiryService {
    repo: Arc<dyn InquiryRepo>,
}

impl AssetInquiryService {
    #[must_use]
    pub fn new(repo: Arc<dyn InquiryRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Service for AssetInquiryService {
    async fn inquiry_asset_gold(&self, ctx: &Context) -> Result<Decimal, StoreError> {
        let gold = self.repo.asset_gold(ctx).await?;
        Ok(gold.map_or(Decimal::ZERO, |g| g.amount))
    }

    async fn inquiry_stocks(&self, ctx: &Context) -> Result<Vec<Stock>, StoreError> {
        self.repo.stocks(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inquiry::entity::AssetGoldOutput;
    use std::sync::Mutex;

    struct FakeRepo {
        gold: Mutex<Option<Result<Option<AssetGoldOutput>, StoreError>>>,
    }

    #[async_trait]
    impl InquiryRepo for FakeRepo {
        async fn asset_gold(&self, _ctx: &Context) -> Result<Option<AssetGoldOutput>, StoreError> {
            self.gold
                .lock()
                .expect("lock")
                .take()
                .unwrap_or(Ok(None))
        }

        async fn stocks(&self, _ctx: &Context) -> Result<Vec<Stock>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn service(gold: Result<Option<AssetGoldOutput>, StoreError>) -> AssetInquiryService {
        AssetInquiryService::new(Arc::new(FakeRepo {
            gold: Mutex::new(Some(gold)),
        }))
    }

    #[tokio::test]
    async fn returns_net_gold_amount() {
        let svc = service(Ok(Some(AssetGoldOutput {
            amount: Decimal::new(15, 1),
            price: Decimal::new(4200000, 2),
            currency: "THB".into(),
        })));
        let amount = svc.inquiry_asset_gold(&Context::background()).await;
        assert_eq!(amount.ok(), Some(Decimal::new(15, 1)));
    }

    #[tokio::test]
    async fn missing_gold_is_zero() {
        let svc = service(Ok(None));
        let amount = svc.inquiry_asset_gold(&Context::background()).await;
        assert_eq!(amount.ok(), Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn repository_errors_surface_unchanged() {
        let svc = service(Err(StoreError::DeadlineExceeded.within("inquiry asset gold")));
        let err = svc
            .inquiry_asset_gold(&Context::background())
            .await
            .unwrap_err();
        assert!(matches!(err.root(), StoreError::DeadlineExceeded));
    }
}
