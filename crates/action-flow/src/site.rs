//! Selectors and entry point of the storefront the probe drives.

pub const DEFAULT_SITE_URL: &str = "https://www.zeptonow.com/";

pub const SELECT_LOCATION_BUTTON: &str = r#"button[aria-label="Select Location"]"#;
pub const ADDRESS_SEARCH_INPUT: &str = r#"input[placeholder="Search a new address"]"#;
pub const ADDRESS_SUGGESTION: &str = r#"div[data-testid="address-search-item"]"#;
pub const LOCATION_CONFIRM_BUTTON: &str = r#"button[data-testid="location-confirm-btn"]"#;
pub const SEARCH_BAR_ICON: &str = r#"div.inline-block.flex-1 a[data-testid="search-bar-icon"]"#;
pub const PRODUCT_SEARCH_INPUT: &str = r#"input[placeholder="Search for over 5000 products"]"#;

pub const PRODUCT_CARD: &str = r#"[data-testid="product-card"]"#;
pub const PRODUCT_CARD_NAME: &str = r#"[data-testid="product-card-name"]"#;
pub const PRODUCT_CARD_PRICE: &str = r#"[data-testid="product-card-price"]"#;
pub const PRODUCT_CARD_QUANTITY: &str = r#"[data-testid="product-card-quantity"] h4"#;

pub const FIRST_PRODUCT_ANCHOR: &str = r#"a[data-testid="product-card"]"#;
pub const INCREASE_QUANTITY_BUTTON: &str = r#"button[aria-label="Increase quantity by 1"]"#;

pub const SUBMIT_KEY: &str = "Enter";
