//! Token classification and symbol aliases.

use sigsettle_core::normalize_symbol;

/// USD stablecoins, valued 1:1 as a quote leg.
const STABLECOINS: &[&str] = &[
    "USDC", "USDC.E", "USDBC", "USDT", "USDT0", "DAI", "BUSD", "FDUSD", "TUSD", "USDE", "PYUSD",
    "FRAX", "LUSD", "GHO", "USDS", "CRVUSD",
];

/// Native and wrapped-native assets, valued through the price oracle.
const WRAPPED_NATIVE: &[&str] = &[
    "ETH", "WETH", "BNB", "WBNB", "MATIC", "WMATIC", "POL", "WPOL", "AVAX", "WAVAX", "SOL", "WSOL",
];

/// Groups of symbols that denote the same asset. The first entry is canonical.
const ALIASES: &[&[&str]] = &[
    &["ETH", "WETH"],
    &["BTC", "WBTC", "BTCB", "CBBTC", "TBTC"],
    &["BNB", "WBNB"],
    &["MATIC", "WMATIC", "POL", "WPOL"],
    &["AVAX", "WAVAX"],
    &["SOL", "WSOL"],
    &["USDC", "USDC.E", "USDBC"],
    &["USDT", "USDT0"],
];

/// Role a transfer can play in a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Stable,
    WrappedNative,
    Target,
}

impl TokenKind {
    pub fn of(symbol: &str) -> Self {
        let sym = normalize_symbol(symbol);
        if STABLECOINS.contains(&sym.as_str()) {
            Self::Stable
        } else if WRAPPED_NATIVE.contains(&sym.as_str()) {
            Self::WrappedNative
        } else {
            Self::Target
        }
    }

    pub fn is_quote(&self) -> bool {
        !matches!(self, Self::Target)
    }
}

/// Canonical symbol for an asset (`WETH` -> `ETH`, `BTCB` -> `BTC`).
pub fn canonical_symbol(symbol: &str) -> String {
    let sym = normalize_symbol(symbol);
    ALIASES
        .iter()
        .find(|group| group.contains(&sym.as_str()))
        .map(|group| group[0].to_string())
        .unwrap_or(sym)
}

/// True when two symbols denote the same asset.
pub fn same_asset(a: &str, b: &str) -> bool {
    canonical_symbol(a) == canonical_symbol(b)
}
