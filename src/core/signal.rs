//! Signal lifecycle and P&L engine.
//!
//! Trading status moves `PENDING → ACTIVE → CLOSED`; approval status moves
//! `PENDING → APPROVED | REJECTED` independently and gates public visibility.
//! Closing computes `profit_loss` in fixed-point decimal and writes the exit
//! fields, the P&L and the status in one conditional update. `live_price` and the
//! target/stop levels are informational and never close a signal on their own.

use crate::{
    core::{
        authz,
        collaborators::CoreContext,
        notification::{self, NotificationEvent},
        product,
    },
    entities::{ApprovalStatus, Signal, SignalStatus, SignalType, max_money, signal},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{debug, info, instrument};

/// Direction of a closed trade's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Positive P&L
    Profit,
    /// Negative P&L
    Loss,
    /// Exactly zero
    BreakEven,
}

impl TradeOutcome {
    /// Classifies a P&L value
    #[must_use]
    pub fn from_pnl(pnl: Decimal) -> Self {
        if pnl.is_zero() {
            Self::BreakEven
        } else if pnl.is_sign_positive() {
            Self::Profit
        } else {
            Self::Loss
        }
    }
}

/// A closed signal together with its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSignal {
    /// Row after the close
    pub signal: signal::Model,
    /// Result classification
    pub outcome: TradeOutcome,
}

/// Input for [`publish_signal`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSignal {
    /// Product the call belongs to
    pub product_id: i64,
    /// Instrument symbol
    pub symbol: String,
    /// Venue, e.g. `NSE`
    pub exchange: Option<String>,
    /// Trade direction
    pub signal_type: SignalType,
    /// Advisory take-profit level
    pub target_price: Option<Decimal>,
    /// Advisory stop level
    pub stop_loss: Option<Decimal>,
    /// Visible to subscribers once active and approved
    pub is_public: bool,
}

/// Aggregate P&L over a product's closed signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PnlSummary {
    /// Closed signals counted
    pub closed: u64,
    /// Signals with positive P&L
    pub wins: u64,
    /// Signals with negative P&L
    pub losses: u64,
    /// Signals that closed flat
    pub break_even: u64,
    /// Sum of P&L
    pub total: Decimal,
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn positive_price(value: Decimal, what: &str) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Err(Error::validation(format!("{what} must be greater than zero")));
    }
    let value = money(value);
    if value > max_money() {
        return Err(Error::validation(format!("{what} cannot exceed {}", max_money())));
    }
    Ok(value)
}

fn optional_price(value: Option<Decimal>, what: &str) -> Result<Option<Decimal>> {
    value.map(|v| positive_price(v, what)).transpose()
}

/// P&L of a trade: `exit - entry` for BUY, `entry - exit` for SELL, at two decimals.
#[must_use]
pub fn compute_profit_loss(signal_type: SignalType, entry: Decimal, exit: Decimal) -> Decimal {
    let (entry, exit) = (money(entry), money(exit));
    match signal_type {
        SignalType::Buy => money(exit - entry),
        SignalType::Sell => money(entry - exit),
    }
}

/// Time in trade as `"{h}h {m}m"`, up to the exit or `now` while still open.
#[must_use]
pub fn format_duration(signal: &signal::Model, now: DateTime<Utc>) -> String {
    let Some(entry) = signal.entry_time else {
        return "0h 0m".to_string();
    };
    let end = signal.exit_time.unwrap_or(now);
    let minutes = (end - entry).num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// Retrieves a signal by id.
///
/// # Errors
/// Returns `Error::NotFound` for an unknown id.
pub async fn get_signal<C: ConnectionTrait>(db: &C, signal_id: i64) -> Result<signal::Model> {
    Signal::find_by_id(signal_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("signal", signal_id))
}

/// Creates a `PENDING` signal awaiting activation and review.
///
/// # Errors
/// - `Error::Validation` for an empty symbol or non-positive levels
/// - `Error::NotFound` for an unknown product or admin
/// - `Error::Unauthorized` if the admin is out of scope
#[instrument(skip(db, ctx, new), fields(symbol = %new.symbol))]
pub async fn publish_signal<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    admin_id: i64,
    new: NewSignal,
) -> Result<signal::Model> {
    let symbol = new.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(Error::validation("Symbol is required"));
    }
    let target_price = optional_price(new.target_price, "Target price")?;
    let stop_loss = optional_price(new.stop_loss, "Stop loss")?;

    let admin = authz::load_admin(db, admin_id).await?;
    let product = product::get_product_by_id(db, new.product_id).await?;
    authz::authorize_for_product(db, ctx, &admin, &product, "publish signal").await?;

    let now = ctx.now();
    let row = signal::ActiveModel {
        product_id: Set(product.id),
        symbol: Set(symbol),
        exchange: Set(new
            .exchange
            .map(|e| e.trim().to_uppercase())
            .filter(|e| !e.is_empty())),
        signal_type: Set(new.signal_type),
        entry_price: Set(None),
        entry_time: Set(None),
        exit_price: Set(None),
        exit_time: Set(None),
        target_price: Set(target_price),
        stop_loss: Set(stop_loss),
        live_price: Set(None),
        status: Set(SignalStatus::Pending),
        approval_status: Set(ApprovalStatus::Pending),
        approved_by: Set(None),
        approved_at: Set(None),
        profit_loss: Set(None),
        is_public: Set(new.is_public),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = row.insert(db).await?;
    info!(
        "Signal #{} published: {} {} for '{}'",
        created.id,
        created.signal_type.to_value(),
        created.symbol,
        product.name
    );

    notification::dispatch(
        db,
        ctx,
        NotificationEvent::SignalPublished {
            signal: &created,
            product: &product,
        },
    )
    .await;
    notification::dispatch(
        db,
        ctx,
        NotificationEvent::SignalApprovalRequired {
            signal: &created,
            product: &product,
        },
    )
    .await;
    Ok(created)
}

/// Opens the trade: `PENDING → ACTIVE` with its entry.
///
/// # Errors
/// - `Error::Validation` for a non-positive entry price
/// - `Error::NotFound` for an unknown signal
/// - `Error::InvalidTransition` unless the signal is `PENDING`
pub async fn activate_signal<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    entry_price: Decimal,
    entry_time: DateTime<Utc>,
) -> Result<signal::Model> {
    let entry_price = positive_price(entry_price, "Entry price")?;

    let result = Signal::update_many()
        .set(signal::ActiveModel {
            status: Set(SignalStatus::Active),
            entry_price: Set(Some(entry_price)),
            entry_time: Set(Some(entry_time)),
            updated_at: Set(ctx.now()),
            ..Default::default()
        })
        .filter(signal::Column::Id.eq(signal_id))
        .filter(signal::Column::Status.eq(SignalStatus::Pending))
        .exec(db)
        .await?;

    let current = get_signal(db, signal_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::transition(
            "signal",
            current.status.to_value(),
            &SignalStatus::Active.to_value(),
        ));
    }
    info!("Signal #{} active at {}", signal_id, entry_price);
    Ok(current)
}

async fn decide_approval<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    admin_id: i64,
    decision: ApprovalStatus,
) -> Result<signal::Model> {
    let existing = get_signal(db, signal_id).await?;
    let admin = authz::load_admin(db, admin_id).await?;
    let product = product::get_product_by_id(db, existing.product_id).await?;
    let action = match decision {
        ApprovalStatus::Rejected => "reject signal",
        _ => "approve signal",
    };
    authz::authorize_for_product(db, ctx, &admin, &product, action).await?;

    let now = ctx.now();
    let result = Signal::update_many()
        .set(signal::ActiveModel {
            approval_status: Set(decision),
            approved_by: Set(Some(admin.id)),
            approved_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(signal::Column::Id.eq(signal_id))
        .filter(signal::Column::ApprovalStatus.eq(ApprovalStatus::Pending))
        .exec(db)
        .await?;

    let current = get_signal(db, signal_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::transition(
            "signal approval",
            current.approval_status.to_value(),
            &decision.to_value(),
        ));
    }
    info!(
        "Signal #{} {} by admin #{}",
        signal_id,
        decision.to_value(),
        admin.id
    );
    Ok(current)
}

/// Approves a signal for public visibility.
///
/// # Errors
/// - `Error::NotFound` for an unknown signal or admin
/// - `Error::Unauthorized` if the admin is out of scope
/// - `Error::InvalidTransition` unless approval is still `PENDING`
pub async fn approve_signal<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    admin_id: i64,
) -> Result<signal::Model> {
    decide_approval(db, ctx, signal_id, admin_id, ApprovalStatus::Approved).await
}

/// Rejects a signal; it stays hidden whatever its trading status.
///
/// # Errors
/// Same as [`approve_signal`].
pub async fn reject_signal<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    admin_id: i64,
) -> Result<signal::Model> {
    decide_approval(db, ctx, signal_id, admin_id, ApprovalStatus::Rejected).await
}

async fn update_open_signal<C: ConnectionTrait>(
    db: &C,
    signal_id: i64,
    changes: signal::ActiveModel,
) -> Result<signal::Model> {
    let result = Signal::update_many()
        .set(changes)
        .filter(signal::Column::Id.eq(signal_id))
        .filter(signal::Column::Status.ne(SignalStatus::Closed))
        .exec(db)
        .await?;

    let current = get_signal(db, signal_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::AlreadyClosed { signal_id });
    }
    Ok(current)
}

/// Records an externally supplied market price. Never touches `profit_loss`.
///
/// # Errors
/// - `Error::Validation` for a non-positive price
/// - `Error::NotFound` for an unknown signal
/// - `Error::AlreadyClosed` once the signal is closed
pub async fn update_live_price<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    live_price: Decimal,
) -> Result<signal::Model> {
    let live_price = positive_price(live_price, "Live price")?;
    let updated = update_open_signal(
        db,
        signal_id,
        signal::ActiveModel {
            live_price: Set(Some(live_price)),
            updated_at: Set(ctx.now()),
            ..Default::default()
        },
    )
    .await?;
    debug!("Signal #{} live price {}", signal_id, live_price);
    Ok(updated)
}

/// Replaces the advisory target and stop levels.
///
/// # Errors
/// - `Error::Validation` for non-positive levels
/// - `Error::NotFound` for an unknown signal
/// - `Error::AlreadyClosed` once the signal is closed
pub async fn update_levels<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    target_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
) -> Result<signal::Model> {
    let target_price = optional_price(target_price, "Target price")?;
    let stop_loss = optional_price(stop_loss, "Stop loss")?;
    update_open_signal(
        db,
        signal_id,
        signal::ActiveModel {
            target_price: Set(target_price),
            stop_loss: Set(stop_loss),
            updated_at: Set(ctx.now()),
            ..Default::default()
        },
    )
    .await
}

/// Closes an active signal and commits its P&L.
///
/// # Errors
/// - `Error::Validation` for a non-positive exit price or an exit before entry
/// - `Error::NotFound` for an unknown signal
/// - `Error::AlreadyClosed` if the exit fields are already set
/// - `Error::InvalidTransition` unless the signal is `ACTIVE`
#[instrument(skip(db, ctx))]
pub async fn close_signal<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    signal_id: i64,
    exit_price: Decimal,
    exit_time: DateTime<Utc>,
) -> Result<ClosedSignal> {
    let exit_price = positive_price(exit_price, "Exit price")?;
    let existing = get_signal(db, signal_id).await?;

    if existing.status == SignalStatus::Closed || existing.exit_price.is_some() {
        return Err(Error::AlreadyClosed { signal_id });
    }
    let (Some(entry_price), SignalStatus::Active) = (existing.entry_price, existing.status) else {
        return Err(Error::transition(
            "signal",
            existing.status.to_value(),
            &SignalStatus::Closed.to_value(),
        ));
    };
    if existing.entry_time.is_some_and(|entry| exit_time < entry) {
        return Err(Error::validation("Exit time cannot be before entry time"));
    }

    let pnl = compute_profit_loss(existing.signal_type, entry_price, exit_price);
    let result = Signal::update_many()
        .set(signal::ActiveModel {
            status: Set(SignalStatus::Closed),
            exit_price: Set(Some(exit_price)),
            exit_time: Set(Some(exit_time)),
            live_price: Set(Some(exit_price)),
            profit_loss: Set(Some(pnl)),
            updated_at: Set(ctx.now()),
            ..Default::default()
        })
        .filter(signal::Column::Id.eq(signal_id))
        .filter(signal::Column::Status.eq(SignalStatus::Active))
        .filter(signal::Column::ExitPrice.is_null())
        .exec(db)
        .await?;

    let current = get_signal(db, signal_id).await?;
    if result.rows_affected == 0 {
        return Err(if current.status == SignalStatus::Closed {
            Error::AlreadyClosed { signal_id }
        } else {
            Error::transition(
                "signal",
                current.status.to_value(),
                &SignalStatus::Closed.to_value(),
            )
        });
    }

    let outcome = TradeOutcome::from_pnl(pnl);
    info!("Signal #{} closed with P&L {} ({:?})", signal_id, pnl, outcome);
    if ctx.settings.notify_on_signal_close {
        notification::dispatch(db, ctx, NotificationEvent::SignalClosed { signal: &current }).await;
    }
    Ok(ClosedSignal {
        signal: current,
        outcome,
    })
}

/// Totals the committed P&L of a product's closed signals.
pub async fn product_pnl_summary<C: ConnectionTrait>(db: &C, product_id: i64) -> Result<PnlSummary> {
    let closed = Signal::find()
        .filter(signal::Column::ProductId.eq(product_id))
        .filter(signal::Column::Status.eq(SignalStatus::Closed))
        .all(db)
        .await?;

    Ok(closed
        .iter()
        .filter_map(|s| s.profit_loss.map(money))
        .fold(PnlSummary::default(), |mut summary, pnl| {
            summary.closed += 1;
            summary.total += pnl;
            match TradeOutcome::from_pnl(pnl) {
                TradeOutcome::Profit => summary.wins += 1,
                TradeOutcome::Loss => summary.losses += 1,
                TradeOutcome::BreakEven => summary.break_even += 1,
            }
            summary
        }))
}

/// Signals subscribers may see: public, approved, and active or closed. Newest first.
pub async fn visible_signals<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
) -> Result<Vec<signal::Model>> {
    Signal::find()
        .filter(signal::Column::ProductId.eq(product_id))
        .filter(signal::Column::Status.is_in([SignalStatus::Active, SignalStatus::Closed]))
        .filter(signal::Column::ApprovalStatus.eq(ApprovalStatus::Approved))
        .filter(signal::Column::IsPublic.eq(true))
        .order_by_desc(signal::Column::CreatedAt)
        .order_by_desc(signal::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::Settings;
    use crate::entities::{AdminNotification, AdminRole, NotificationKind, admin_notification};
    use crate::test_utils::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        env: TestEnv,
        product_id: i64,
        staff_id: i64,
    }

    async fn fixture_with(settings: Settings) -> Result<Fixture> {
        let env = setup_env_with(settings).await?;
        let product = create_test_product(&env, "Gold", dec!(999.00), 30).await?;
        let staff = create_test_admin(&env, "gold-desk", AdminRole::Staff, Some("Gold")).await?;
        Ok(Fixture {
            env,
            product_id: product.id,
            staff_id: staff.id,
        })
    }

    async fn fixture() -> Result<Fixture> {
        fixture_with(Settings::default()).await
    }

    fn new_signal(product_id: i64, signal_type: SignalType) -> NewSignal {
        NewSignal {
            product_id,
            symbol: " reliance ".to_string(),
            exchange: Some("nse".to_string()),
            signal_type,
            target_price: Some(dec!(120.00)),
            stop_loss: Some(dec!(95.00)),
            is_public: true,
        }
    }

    async fn active_signal(f: &Fixture, signal_type: SignalType, entry: Decimal) -> Result<i64> {
        let signal = publish_signal(
            &f.env.db,
            &f.env.ctx,
            f.staff_id,
            new_signal(f.product_id, signal_type),
        )
        .await?;
        activate_signal(&f.env.db, &f.env.ctx, signal.id, entry, fixed_now()).await?;
        Ok(signal.id)
    }

    #[test]
    fn test_profit_loss_by_direction() {
        assert_eq!(
            compute_profit_loss(SignalType::Buy, dec!(100.00), dec!(110.00)),
            dec!(10.00)
        );
        assert_eq!(
            compute_profit_loss(SignalType::Sell, dec!(100.00), dec!(90.00)),
            dec!(10.00)
        );
        assert_eq!(
            compute_profit_loss(SignalType::Buy, dec!(100.00), dec!(97.25)),
            dec!(-2.75)
        );
        // Inputs are taken at two decimals before subtracting
        assert_eq!(
            compute_profit_loss(SignalType::Buy, dec!(0.105), dec!(0.2)),
            dec!(0.09)
        );
    }

    #[test]
    fn test_repeated_aggregation_has_no_drift() {
        let total: Decimal = (0..1000).map(|_| dec!(0.10)).sum();
        assert_eq!(total, dec!(100.00));
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(TradeOutcome::from_pnl(dec!(0.01)), TradeOutcome::Profit);
        assert_eq!(TradeOutcome::from_pnl(dec!(-0.01)), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::from_pnl(dec!(0.00)), TradeOutcome::BreakEven);
    }

    #[tokio::test]
    async fn test_publish_creates_pending_and_notifies() -> Result<()> {
        let f = fixture().await?;
        let signal = publish_signal(
            &f.env.db,
            &f.env.ctx,
            f.staff_id,
            new_signal(f.product_id, SignalType::Buy),
        )
        .await?;

        assert_eq!(signal.symbol, "RELIANCE");
        assert_eq!(signal.exchange.as_deref(), Some("NSE"));
        assert_eq!(signal.status, SignalStatus::Pending);
        assert_eq!(signal.approval_status, ApprovalStatus::Pending);
        assert!(signal.exit_price.is_none());

        let rows = AdminNotification::find()
            .filter(admin_notification::Column::RelatedId.eq(signal.id))
            .all(&f.env.db)
            .await?;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.notification_type == NotificationKind::Signal));
        Ok(())
    }

    #[tokio::test]
    async fn test_close_buy_and_sell() -> Result<()> {
        let f = fixture().await?;

        let buy = active_signal(&f, SignalType::Buy, dec!(100.00)).await?;
        let exit_time = fixed_now() + Duration::minutes(135);
        let closed = close_signal(&f.env.db, &f.env.ctx, buy, dec!(110.00), exit_time).await?;
        assert_eq!(closed.signal.profit_loss, Some(dec!(10.00)));
        assert_eq!(closed.signal.status, SignalStatus::Closed);
        assert_eq!(closed.signal.live_price, Some(dec!(110.00)));
        assert_eq!(closed.outcome, TradeOutcome::Profit);
        assert_eq!(format_duration(&closed.signal, fixed_now()), "2h 15m");

        let sell = active_signal(&f, SignalType::Sell, dec!(100.00)).await?;
        let closed = close_signal(&f.env.db, &f.env.ctx, sell, dec!(90.00), exit_time).await?;
        assert_eq!(closed.signal.profit_loss, Some(dec!(10.00)));
        Ok(())
    }

    #[tokio::test]
    async fn test_close_twice_is_already_closed() -> Result<()> {
        let f = fixture().await?;
        let id = active_signal(&f, SignalType::Buy, dec!(100.00)).await?;

        close_signal(&f.env.db, &f.env.ctx, id, dec!(110.00), fixed_now()).await?;
        let again = close_signal(&f.env.db, &f.env.ctx, id, dec!(120.00), fixed_now()).await;
        assert!(matches!(again, Err(Error::AlreadyClosed { .. })));
        assert_eq!(get_signal(&f.env.db, id).await?.profit_loss, Some(dec!(10.00)));
        Ok(())
    }

    #[tokio::test]
    async fn test_close_from_pending_is_invalid() -> Result<()> {
        let f = fixture().await?;
        let signal = publish_signal(
            &f.env.db,
            &f.env.ctx,
            f.staff_id,
            new_signal(f.product_id, SignalType::Buy),
        )
        .await?;

        let result = close_signal(&f.env.db, &f.env.ctx, signal.id, dec!(110.00), fixed_now()).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_close_has_one_winner() -> Result<()> {
        let f = fixture().await?;
        let id = active_signal(&f, SignalType::Buy, dec!(100.00)).await?;

        let (a, b) = tokio::join!(
            close_signal(&f.env.db, &f.env.ctx, id, dec!(110.00), fixed_now()),
            close_signal(&f.env.db, &f.env.ctx, id, dec!(90.00), fixed_now()),
        );
        assert!(a.is_ok() != b.is_ok());
        assert!(
            matches!(a, Err(Error::AlreadyClosed { .. }))
                || matches!(b, Err(Error::AlreadyClosed { .. }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_live_price_and_levels_are_advisory() -> Result<()> {
        let f = fixture().await?;
        let id = active_signal(&f, SignalType::Buy, dec!(100.00)).await?;

        // Past the stop, still open
        let updated = update_live_price(&f.env.db, &f.env.ctx, id, dec!(80.00)).await?;
        assert_eq!(updated.status, SignalStatus::Active);
        assert!(updated.profit_loss.is_none());

        let levels =
            update_levels(&f.env.db, &f.env.ctx, id, Some(dec!(130.00)), None).await?;
        assert_eq!(levels.target_price, Some(dec!(130.00)));
        assert!(levels.stop_loss.is_none());

        let oversized = update_live_price(&f.env.db, &f.env.ctx, id, dec!(100000000.00)).await;
        assert!(matches!(oversized, Err(Error::Validation { .. })));
        let oversized_close =
            close_signal(&f.env.db, &f.env.ctx, id, dec!(100000000.00), fixed_now()).await;
        assert!(matches!(oversized_close, Err(Error::Validation { .. })));

        close_signal(&f.env.db, &f.env.ctx, id, dec!(105.00), fixed_now()).await?;
        let after = update_live_price(&f.env.db, &f.env.ctx, id, dec!(1.00)).await;
        assert!(matches!(after, Err(Error::AlreadyClosed { .. })));
        assert_eq!(get_signal(&f.env.db, id).await?.profit_loss, Some(dec!(5.00)));
        Ok(())
    }

    #[tokio::test]
    async fn test_visibility_needs_approval() -> Result<()> {
        let f = fixture().await?;
        let id = active_signal(&f, SignalType::Buy, dec!(100.00)).await?;
        assert!(visible_signals(&f.env.db, f.product_id).await?.is_empty());

        approve_signal(&f.env.db, &f.env.ctx, id, f.staff_id).await?;
        assert_eq!(visible_signals(&f.env.db, f.product_id).await?.len(), 1);

        let again = reject_signal(&f.env.db, &f.env.ctx, id, f.staff_id).await;
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_scope_staff_cannot_publish() -> Result<()> {
        let f = fixture().await?;
        let other =
            create_test_admin(&f.env, "silver-desk", AdminRole::Staff, Some("Silver")).await?;
        let result = publish_signal(
            &f.env.db,
            &f.env.ctx,
            other.id,
            new_signal(f.product_id, SignalType::Sell),
        )
        .await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_pnl_summary() -> Result<()> {
        let f = fixture().await?;
        for (signal_type, exit) in [
            (SignalType::Buy, dec!(110.00)),
            (SignalType::Buy, dec!(95.50)),
            (SignalType::Sell, dec!(100.00)),
        ] {
            let id = active_signal(&f, signal_type, dec!(100.00)).await?;
            close_signal(&f.env.db, &f.env.ctx, id, exit, fixed_now()).await?;
        }
        active_signal(&f, SignalType::Sell, dec!(50.00)).await?;

        let summary = product_pnl_summary(&f.env.db, f.product_id).await?;
        assert_eq!(summary.closed, 3);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.break_even, 1);
        assert_eq!(summary.total, dec!(5.50));
        Ok(())
    }

    #[tokio::test]
    async fn test_close_notification_follows_setting() -> Result<()> {
        let f = fixture_with(Settings {
            notify_on_signal_close: false,
            ..Settings::default()
        })
        .await?;
        let id = active_signal(&f, SignalType::Buy, dec!(100.00)).await?;
        let before = AdminNotification::find().count(&f.env.db).await?;

        close_signal(&f.env.db, &f.env.ctx, id, dec!(101.00), fixed_now()).await?;
        assert_eq!(AdminNotification::find().count(&f.env.db).await?, before);
        Ok(())
    }

    #[test]
    fn test_format_duration_without_entry() {
        let model = signal::Model {
            id: 1,
            product_id: 1,
            symbol: "X".to_string(),
            exchange: None,
            signal_type: SignalType::Buy,
            entry_price: None,
            entry_time: None,
            exit_price: None,
            exit_time: None,
            target_price: None,
            stop_loss: None,
            live_price: None,
            status: SignalStatus::Pending,
            approval_status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
            profit_loss: None,
            is_public: false,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        };
        assert_eq!(format_duration(&model, fixed_now()), "0h 0m");
    }
}
