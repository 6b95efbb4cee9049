use async_trait::async_trait;
use wayfinder_core::{Gateway, GatewaysProvider, WayfinderError};

/// Fixed gateway list, supplied once at construction.
pub struct StaticGatewaysProvider {
    gateways: Vec<Gateway>,
}

impl StaticGatewaysProvider {
    pub fn new(gateways: Vec<Gateway>) -> Self {
        Self { gateways }
    }
}

#[async_trait]
impl GatewaysProvider for StaticGatewaysProvider {
    async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError> {
        if self.gateways.is_empty() {
            return Err(WayfinderError::NoGateways);
        }
        Ok(self.gateways.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_fixed_list() {
        let a = Gateway::parse("https://a.example").unwrap();
        let b = Gateway::parse("https://b.example").unwrap();
        let provider = StaticGatewaysProvider::new(vec![a.clone(), b.clone()]);
        assert_eq!(provider.get_gateways().await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn empty_list_is_no_gateways_error() {
        let provider = StaticGatewaysProvider::new(vec![]);
        assert!(matches!(
            provider.get_gateways().await,
            Err(WayfinderError::NoGateways)
        ));
    }
}
