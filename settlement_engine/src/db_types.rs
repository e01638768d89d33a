use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use pse_common::Rub;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// The Gate payout status code meaning "approved, awaiting transfer confirmation". Only payouts in this state are
/// candidates for receipt matching.
pub const GATE_STATUS_AWAITING_CONFIRMATION: i64 = 5;

/// Bybit order status code for a cancelled order. The live code is authoritative over any local signal.
pub const ORDER_STATUS_CANCELLED: i64 = 50;

/// Bybit order status codes in which an order is live and must be tracked.
pub const ORDER_ACTIVE_STATUSES: [i64; 2] = [10, 20];

/// Bybit order status code for an order under dispute.
pub const ORDER_STATUS_APPEAL: i64 = 30;

//--------------------------------------      PayoutId       ---------------------------------------------------------
/// The settlement platform's external identifier for a payout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PayoutId(pub String);

impl FromStr for PayoutId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PayoutId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PayoutId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       ItemId        ---------------------------------------------------------
/// The trading platform's external identifier for an advertisement. This is the join key used to bind orders to
/// transactions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ItemId(pub String);

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       OrderId       ---------------------------------------------------------
/// The trading platform's external identifier for a live trade order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       Payout        ---------------------------------------------------------
/// A money-transfer request ingested from the settlement platform. Payouts are created by the payout feed
/// collaborator via upsert and only read and linked by the engine.
#[derive(Debug, Clone, FromRow)]
pub struct Payout {
    pub id: i64,
    pub payout_id: PayoutId,
    /// Phone number or card number the fiat must be sent to.
    pub wallet: String,
    pub amount: Rub,
    /// Free-text bank descriptor as supplied by the settlement platform, e.g. "Т-Банк" or "sberbank".
    pub bank: String,
    /// Platform-defined lifecycle status code. See [`GATE_STATUS_AWAITING_CONFIRMATION`].
    pub status: i64,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayout {
    pub payout_id: PayoutId,
    pub wallet: String,
    pub amount: Rub,
    pub bank: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
}

impl NewPayout {
    pub fn new(payout_id: PayoutId, wallet: String, amount: Rub, bank: String) -> Self {
        Self { payout_id, wallet, amount, bank, status: GATE_STATUS_AWAITING_CONFIRMATION, created_at: Utc::now() }
    }
}

//--------------------------------------   PaymentMethod     ---------------------------------------------------------
/// The payment rail advertised on the trading platform. An account holding two active advertisements must use a
/// different method on each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Fast phone-number transfer (SBP).
    Sbp,
    /// Direct card-to-card transfer.
    Card,
}

impl PaymentMethod {
    pub fn opposite(&self) -> Self {
        match self {
            PaymentMethod::Sbp => PaymentMethod::Card,
            PaymentMethod::Card => PaymentMethod::Sbp,
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Sbp => write!(f, "Sbp"),
            PaymentMethod::Card => write!(f, "Card"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sbp" => Ok(Self::Sbp),
            "Card" => Ok(Self::Card),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------   Advertisement     ---------------------------------------------------------
/// A sell offer posted on the trading platform, backing exactly one payout.
#[derive(Debug, Clone, FromRow)]
pub struct Advertisement {
    pub id: i64,
    pub item_id: ItemId,
    pub account_id: String,
    pub payout_id: PayoutId,
    pub price: Rub,
    /// Crypto quantity offered, as a decimal string. Pricing itself is out of scope; the value is carried verbatim.
    pub quantity: String,
    pub payment_method: PaymentMethod,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdvertisement {
    pub item_id: ItemId,
    pub account_id: String,
    pub payout_id: PayoutId,
    pub price: Rub,
    pub quantity: String,
    pub payment_method: PaymentMethod,
}

//-------------------------------------- TransactionStatus   ---------------------------------------------------------
/// The internal transaction lifecycle.
///
/// The happy path runs `Pending → ChatStarted → WaitingPayment → PaymentReceived/ReceiptReceived → ReleaseMoney →
/// Completed`. The terminal states `Cancelled`, `Failed` and `Blacklisted` are reachable from any non-terminal
/// state, and `Appeal` is reachable from `PaymentReceived`/`ReleaseMoney` on a dispute signal. All transitions are
/// monotonic forward; nothing ever leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Advertisement posted, no counterparty yet.
    Pending,
    /// An order has been bound and the trade chat is open.
    ChatStarted,
    /// Chat automation has run its course; we are waiting for the counterparty to pay.
    WaitingPayment,
    /// The counterparty marked the order as paid on the platform.
    PaymentReceived,
    /// A bank receipt has been matched to this transaction.
    ReceiptReceived,
    /// The safety delay has elapsed and funds release is in flight.
    ReleaseMoney,
    /// Funds released, order closed.
    Completed,
    /// The order was cancelled on the platform or by the counterparty.
    Cancelled,
    /// An external action failed; operator attention required.
    Failed,
    /// The payout wallet is blacklisted. Recorded so the payout is never re-processed.
    Blacklisted,
    /// The order is under dispute on the platform.
    Appeal,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed | Self::Blacklisted)
    }

    /// Whether the edge `self → new` is a legal state-machine transition.
    ///
    /// Terminal states are absorbing. Any non-terminal state may short-circuit to `Cancelled`, `Failed` or
    /// `Blacklisted`. Everything else must move forward along the happy path.
    pub fn can_transition_to(&self, new: TransactionStatus) -> bool {
        use TransactionStatus::*;
        if self.is_terminal() || *self == new {
            return false;
        }
        if matches!(new, Cancelled | Failed | Blacklisted) {
            return true;
        }
        match (*self, new) {
            (Pending, ChatStarted) => true,
            (ChatStarted, WaitingPayment) => true,
            (WaitingPayment, PaymentReceived) => true,
            // A receipt can arrive and match before, during, or after the chat/payment stages.
            (Pending | ChatStarted | WaitingPayment | PaymentReceived, ReceiptReceived) => true,
            (PaymentReceived | ReceiptReceived, ReleaseMoney) => true,
            (ReceiptReceived | ReleaseMoney, Completed) => true,
            (PaymentReceived | ReleaseMoney, Appeal) => true,
            // A resolved dispute either completes or terminates; termination is covered above.
            (Appeal, Completed) => true,
            (_, _) => false,
        }
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::ChatStarted => "ChatStarted",
            TransactionStatus::WaitingPayment => "WaitingPayment",
            TransactionStatus::PaymentReceived => "PaymentReceived",
            TransactionStatus::ReceiptReceived => "ReceiptReceived",
            TransactionStatus::ReleaseMoney => "ReleaseMoney",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Cancelled => "Cancelled",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Blacklisted => "Blacklisted",
            TransactionStatus::Appeal => "Appeal",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "ChatStarted" => Ok(Self::ChatStarted),
            "WaitingPayment" => Ok(Self::WaitingPayment),
            "PaymentReceived" => Ok(Self::PaymentReceived),
            "ReceiptReceived" => Ok(Self::ReceiptReceived),
            "ReleaseMoney" => Ok(Self::ReleaseMoney),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Failed" => Ok(Self::Failed),
            "Blacklisted" => Ok(Self::Blacklisted),
            "Appeal" => Ok(Self::Appeal),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

//--------------------------------------    Transaction      ---------------------------------------------------------
/// The internal aggregate tying a payout, advertisement, order and receipt together. Created by the advertisement
/// issuer; mutated only through guarded status updates; never deleted, only terminated.
#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: i64,
    /// Unique — enforces the 1:1 payout/transaction invariant.
    pub payout_id: PayoutId,
    pub item_id: ItemId,
    /// Set exactly once when a counterparty engages; unique once set.
    pub order_id: Option<OrderId>,
    pub status: TransactionStatus,
    pub chat_step: i64,
    pub receipt_received_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    ChatMessage      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ChatSender {
    Us,
    Counterparty,
}

impl Display for ChatSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatSender::Us => write!(f, "Us"),
            ChatSender::Counterparty => write!(f, "Counterparty"),
        }
    }
}

impl FromStr for ChatSender {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Us" => Ok(Self::Us),
            "Counterparty" => Ok(Self::Counterparty),
            s => Err(ConversionError(format!("Invalid chat sender: {s}"))),
        }
    }
}

/// One message on the trade-order chat. De-duplicated by the platform's external message id, so chat automation is
/// idempotent under re-delivery.
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub transaction_id: i64,
    pub external_id: String,
    pub sender: ChatSender,
    pub body: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub transaction_id: i64,
    pub external_id: String,
    pub sender: ChatSender,
    pub body: String,
}

//--------------------------------------    TransferType     ---------------------------------------------------------
/// How the bank transfer on a receipt was routed. The matching rules for bank and wallet depend on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransferType {
    /// Transfer to an account held at the platform's own bank brand (T-Bank).
    ToTbank,
    /// Direct card-to-card transfer.
    ToCard,
    /// Phone-number-routed transfer (SBP).
    ByPhone,
}

impl Display for TransferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferType::ToTbank => write!(f, "ToTbank"),
            TransferType::ToCard => write!(f, "ToCard"),
            TransferType::ByPhone => write!(f, "ByPhone"),
        }
    }
}

impl FromStr for TransferType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ToTbank" | "TO_TBANK" => Ok(Self::ToTbank),
            "ToCard" | "TO_CARD" => Ok(Self::ToCard),
            "ByPhone" | "BY_PHONE" => Ok(Self::ByPhone),
            s => Err(ConversionError(format!("Invalid transfer type: {s}"))),
        }
    }
}

//--------------------------------------    ReceiptStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    InProgress,
    Failed,
}

impl Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiptStatus::Success => write!(f, "Success"),
            ReceiptStatus::InProgress => write!(f, "InProgress"),
            ReceiptStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for ReceiptStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" | "SUCCESS" => Ok(Self::Success),
            "InProgress" | "IN_PROGRESS" => Ok(Self::InProgress),
            "Failed" | "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid receipt status: {s}"))),
        }
    }
}

//--------------------------------------       Receipt       ---------------------------------------------------------
/// A parsed bank-transfer confirmation. Created once per unique source email id; matched to at most one payout;
/// never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Receipt {
    pub id: i64,
    /// The mail provider's id for the source email. Unique — de-duplicates re-delivery.
    pub email_id: String,
    pub amount: Rub,
    pub transfer_date: DateTime<Utc>,
    pub bank: Option<String>,
    pub phone: Option<String>,
    pub card: Option<String>,
    pub transfer_type: TransferType,
    pub status: ReceiptStatus,
    /// Set when PDF extraction failed; such receipts are excluded from matching until corrected.
    pub parse_error: Option<String>,
    /// Set exactly once when the receipt is matched.
    pub payout_id: Option<PayoutId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub email_id: String,
    pub amount: Rub,
    pub transfer_date: DateTime<Utc>,
    pub bank: Option<String>,
    pub phone: Option<String>,
    pub card: Option<String>,
    pub transfer_type: TransferType,
    pub status: ReceiptStatus,
    pub parse_error: Option<String>,
}

//--------------------------------------    BybitAccount     ---------------------------------------------------------
/// A trading account credential set. The active-ad count is derived from the advertisements table and always
/// re-verified against the live platform, never stored authoritatively.
#[derive(Clone, FromRow)]
pub struct BybitAccount {
    pub id: i64,
    pub account_id: String,
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for BybitAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitAccount")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("name", &self.name)
            .field("api_key", &"****")
            .field("api_secret", &"****")
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        use TransactionStatus::*;
        for terminal in [Completed, Cancelled, Failed, Blacklisted] {
            for target in [
                Pending,
                ChatStarted,
                WaitingPayment,
                PaymentReceived,
                ReceiptReceived,
                ReleaseMoney,
                Completed,
                Cancelled,
                Failed,
                Blacklisted,
                Appeal,
            ] {
                assert!(!terminal.can_transition_to(target), "{terminal} -> {target} must be rejected");
            }
        }
    }

    #[test]
    fn cancellation_reachable_from_any_non_terminal_state() {
        use TransactionStatus::*;
        for from in [Pending, ChatStarted, WaitingPayment, PaymentReceived, ReceiptReceived, ReleaseMoney, Appeal] {
            assert!(from.can_transition_to(Cancelled), "{from} -> Cancelled must be allowed");
            assert!(from.can_transition_to(Failed), "{from} -> Failed must be allowed");
        }
    }

    #[test]
    fn happy_path_is_forward_only() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(ChatStarted));
        assert!(ChatStarted.can_transition_to(WaitingPayment));
        assert!(WaitingPayment.can_transition_to(PaymentReceived));
        assert!(PaymentReceived.can_transition_to(ReceiptReceived));
        assert!(ReceiptReceived.can_transition_to(ReleaseMoney));
        assert!(ReleaseMoney.can_transition_to(Completed));
        // No regressions.
        assert!(!ChatStarted.can_transition_to(Pending));
        assert!(!WaitingPayment.can_transition_to(ChatStarted));
        assert!(!ReceiptReceived.can_transition_to(WaitingPayment));
    }

    #[test]
    fn appeal_only_from_payment_stages() {
        use TransactionStatus::*;
        assert!(PaymentReceived.can_transition_to(Appeal));
        assert!(ReleaseMoney.can_transition_to(Appeal));
        assert!(!Pending.can_transition_to(Appeal));
        assert!(!ChatStarted.can_transition_to(Appeal));
    }

    #[test]
    fn status_round_trips_through_strings() {
        use TransactionStatus::*;
        for s in [Pending, ChatStarted, WaitingPayment, PaymentReceived, ReceiptReceived, ReleaseMoney, Completed,
            Cancelled, Failed, Blacklisted, Appeal]
        {
            assert_eq!(s.to_string().parse::<TransactionStatus>().unwrap(), s);
        }
    }

    #[test]
    fn transfer_type_accepts_wire_spelling() {
        assert_eq!("TO_TBANK".parse::<TransferType>().unwrap(), TransferType::ToTbank);
        assert_eq!("ByPhone".parse::<TransferType>().unwrap(), TransferType::ByPhone);
        assert_eq!("SUCCESS".parse::<ReceiptStatus>().unwrap(), ReceiptStatus::Success);
    }
}
