//! Product-card projection over the rendered listing

use action_primitives::{ActionError, ActionPrimitives};
use tracing::debug;

use crate::site;
use crate::types::ProductRecord;

/// Read-only projection of product cards into [`ProductRecord`]s.
///
/// Each card resolves its name, price and quantity independently; a missing
/// sub-element yields the `"N/A"` sentinel for that field only.
#[derive(Debug, Clone)]
pub struct AvailabilityExtractor {
    card: String,
    name: String,
    price: String,
    quantity: String,
}

impl Default for AvailabilityExtractor {
    fn default() -> Self {
        Self {
            card: site::PRODUCT_CARD.to_string(),
            name: site::PRODUCT_CARD_NAME.to_string(),
            price: site::PRODUCT_CARD_PRICE.to_string(),
            quantity: site::PRODUCT_CARD_QUANTITY.to_string(),
        }
    }
}

impl AvailabilityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn card_selector(&self) -> &str {
        &self.card
    }

    /// Records for every card currently rendered, in document order.
    pub async fn extract<P>(&self, page: &P) -> Result<Vec<ProductRecord>, ActionError>
    where
        P: ActionPrimitives + ?Sized,
    {
        let rows = page
            .text_fields(
                &self.card,
                &[self.name.as_str(), self.price.as_str(), self.quantity.as_str()],
            )
            .await?;

        let records: Vec<ProductRecord> = rows.into_iter().map(record_from_row).collect();
        debug!(cards = records.len(), "extracted product cards");
        Ok(records)
    }
}

fn record_from_row(row: Vec<Option<String>>) -> ProductRecord {
    let mut fields = row.into_iter();
    let name = fields.next().flatten();
    let price = fields.next().flatten();
    let quantity = fields.next().flatten();
    ProductRecord::from_fields(name, price, quantity)
}
