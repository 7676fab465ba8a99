//! Typed wrappers over the agency API endpoints.

use tracing::debug;

use housing_shared::{AgencyApiConfig, ListingId, Locale, Result};

use crate::client::FetchClient;
use crate::models::{BuildingTransactions, EstateDetail, ListingPage, MonthlyMarketResponse};

/// Agency API bound to one fetch session.
#[derive(Debug, Clone)]
pub struct AgencyApi {
    client: FetchClient,
    config: AgencyApiConfig,
}

impl AgencyApi {
    pub fn new(client: FetchClient, config: AgencyApiConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &AgencyApiConfig {
        &self.config
    }

    /// Refresh session cookies against the configured homepage.
    pub async fn refresh_session(&self) -> Result<()> {
        self.client.refresh_session(&self.config.homepage).await
    }

    /// One page of the listing enumeration. Pages start at 1.
    pub async fn listing_page(&self, page: u32, page_size: u32, locale: Locale) -> Result<ListingPage> {
        debug!(page, page_size, %locale, "fetching listing page");
        let params = [
            ("lang", locale.wire_code().to_string()),
            ("hash", "true".to_string()),
            ("currency", "HKD".to_string()),
            ("unit", "feet".to_string()),
            ("search_behavior", "normal".to_string()),
            ("limit", page_size.to_string()),
            ("page", page.to_string()),
        ];
        self.client
            .get_json(&self.config.all_estate_info, &params)
            .await
    }

    pub async fn estate_detail(&self, id: &ListingId, locale: Locale) -> Result<EstateDetail> {
        let url = fill(&self.config.single_estate_info, "{estate_id}", id.as_str());
        self.client
            .get_json(&url, &[("lang", locale.wire_code().to_string())])
            .await
    }

    pub async fn estate_monthly_market(&self, id: &ListingId) -> Result<MonthlyMarketResponse> {
        let url = fill(&self.config.estate_monthly_market_info, "{estate_id}", id.as_str());
        self.client
            .get_json(&url, &[("lang", Locale::CANONICAL.wire_code().to_string())])
            .await
    }

    pub async fn building_transactions(&self, building_id: &str) -> Result<BuildingTransactions> {
        let url = fill(&self.config.building_transactions, "{building_id}", building_id);
        self.client
            .get_json(&url, &[("lang", Locale::CANONICAL.wire_code().to_string())])
            .await
    }
}

fn fill(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(placeholder, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_shared::FetchConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> AgencyApi {
        let base = server.uri();
        let config = AgencyApiConfig {
            homepage: format!("{base}/"),
            all_estate_info: format!("{base}/estates"),
            single_estate_info: format!("{base}/estates/{{estate_id}}"),
            estate_monthly_market_info: format!("{base}/estates/{{estate_id}}/monthly"),
            building_transactions: format!("{base}/buildings/{{building_id}}/transactions"),
            ..AgencyApiConfig::default()
        };
        let client = FetchClient::new(FetchConfig {
            max_attempts: 1,
            retry_delay_ms: 0,
            request_delay_ms: 0,
            ..FetchConfig::default()
        })
        .unwrap();
        AgencyApi::new(client, config)
    }

    #[test]
    fn fills_url_placeholders() {
        assert_eq!(
            fill("https://x/estate/{estate_id}/info", "{estate_id}", "E9"),
            "https://x/estate/E9/info"
        );
    }

    #[tokio::test]
    async fn listing_page_sends_paging_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/estates"))
            .and(query_param("lang", "zh-hk"))
            .and(query_param("limit", "2"))
            .and(query_param("page", "3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"count": 5, "result": [{"id": "E5"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let page = api_for(&server)
            .listing_page(3, 2, Locale::ZhHk)
            .await
            .unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.result.len(), 1);
    }

    #[tokio::test]
    async fn estate_detail_uses_locale() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/estates/E1"))
            .and(query_param("lang", "en"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "E1", "name": {"en": "Harbour View"}}"#),
            )
            .mount(&server)
            .await;

        let detail = api_for(&server)
            .estate_detail(&ListingId::new("E1"), Locale::En)
            .await
            .unwrap();
        assert_eq!(detail.name.en.as_deref(), Some("Harbour View"));
    }

    #[tokio::test]
    async fn building_transactions_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buildings/B7/transactions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"building": {"id": "B7"}, "data": []}"#),
            )
            .mount(&server)
            .await;

        let resp = api_for(&server).building_transactions("B7").await.unwrap();
        assert_eq!(resp.building.id, "B7");
    }
}
