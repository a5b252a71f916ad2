/// Bank statement conversion (PDF to CSV)
use crate::{
    config::BankToFileConfig,
    db::models::DocumentType,
    error::{ChaseError, ChaseResult},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// Shared converter trait object
pub type DynDocumentConverter = Arc<dyn DocumentConverter>;

/// Converts statements into spreadsheet-friendly CSV
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert_to_csv(&self, file_name: &str, bytes: Vec<u8>) -> ChaseResult<Vec<u8>>;
}

/// Whether a received file should go through conversion
pub fn is_convertible(document_type: DocumentType, mime_type: &str) -> bool {
    document_type == DocumentType::BankStatements
        && mime_type.eq_ignore_ascii_case("application/pdf")
}

/// File name for the converted output (`statement.pdf` -> `statement.csv`)
pub fn csv_file_name(original: &str) -> String {
    match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{}.csv", stem),
        _ => format!("{}.csv", original),
    }
}

/// BankToFile API client
pub struct BankToFileClient {
    http: reqwest::Client,
    config: BankToFileConfig,
}

impl BankToFileClient {
    pub fn new(config: BankToFileConfig) -> ChaseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl DocumentConverter for BankToFileClient {
    async fn convert_to_csv(&self, file_name: &str, bytes: Vec<u8>) -> ChaseResult<Vec<u8>> {
        if self.config.api_key.is_empty() {
            return Err(ChaseError::vendor("BankToFile", "API key not configured"));
        }

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/convert?format=csv", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChaseError::vendor(
                "BankToFile",
                format!("HTTP {} {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_bank_statement_pdfs_convert() {
        assert!(is_convertible(DocumentType::BankStatements, "application/pdf"));
        assert!(is_convertible(DocumentType::BankStatements, "Application/PDF"));
        assert!(!is_convertible(DocumentType::BankStatements, "image/jpeg"));
        assert!(!is_convertible(DocumentType::Receipts, "application/pdf"));
    }

    #[test]
    fn test_csv_file_name() {
        assert_eq!(csv_file_name("march.statement.pdf"), "march.statement.csv");
        assert_eq!(csv_file_name("statement"), "statement.csv");
        assert_eq!(csv_file_name(".pdf"), ".pdf.csv");
    }

    #[tokio::test]
    async fn test_missing_key_is_vendor_error() {
        let client = BankToFileClient::new(crate::config::ServerConfig::for_tests().banktofile).unwrap();
        let result = client.convert_to_csv("a.pdf", b"%PDF-1.4".to_vec()).await;
        assert!(matches!(result, Err(ChaseError::Vendor { service: "BankToFile", .. })));
    }
}
