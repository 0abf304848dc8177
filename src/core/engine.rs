use super::types::{
    BucketBalances, BucketPolicy, Holding, HouseholdProfile, ProjectionSummary, RebalanceAction,
    WithdrawalSource, YearlyProjection,
};

const GROWTH_REFILL_SAFETY_MULTIPLE: f64 = 2.0;

pub fn run_projection(
    profile: &HouseholdProfile,
    policy: &BucketPolicy,
    holdings: &[Holding],
    start_year: i32,
) -> Vec<YearlyProjection> {
    if profile.life_expectancy < profile.current_age {
        return Vec::new();
    }
    let opening = BucketBalances::from_holdings(holdings);
    let last_offset = profile.life_expectancy - profile.current_age;

    let (_, projections) = (0..=last_offset).fold(
        (opening, Vec::with_capacity(profile.projection_years())),
        |(balances, mut projections), year_offset| {
            let (next, record) = project_year(profile, policy, balances, year_offset, start_year);
            projections.push(record);
            (next, projections)
        },
    );
    projections
}

pub fn project_year(
    profile: &HouseholdProfile,
    policy: &BucketPolicy,
    balances: BucketBalances,
    year_offset: u32,
    start_year: i32,
) -> (BucketBalances, YearlyProjection) {
    let inflation = inflation_factor(profile.inflation_rate, year_offset);
    let spending_need = profile.monthly_spending * 12.0 * inflation;
    let income = guaranteed_income(profile, year_offset, inflation);
    let withdrawal_needed = (spending_need - income).max(0.0);

    let (after_withdrawal, withdrawal_source) = withdraw_waterfall(balances, withdrawal_needed);
    let grown = apply_returns(after_withdrawal, policy);
    let cash_target = spending_need * policy.cash_target_years;
    let (end, action) = refill_cash(grown, cash_target);

    let record = YearlyProjection {
        year: start_year.saturating_add_unsigned(year_offset),
        age: profile.current_age.saturating_add(year_offset),
        spending_need,
        income,
        withdrawal_needed,
        start_balance_cash: balances.cash,
        start_balance_income: balances.income,
        start_balance_growth: balances.growth,
        end_balance_cash: end.cash,
        end_balance_income: end.income,
        end_balance_growth: end.growth,
        total_portfolio: end.total(),
        withdrawal_source,
        action,
    };
    (end, record)
}

fn inflation_factor(inflation_rate: f64, year_offset: u32) -> f64 {
    (1.0 + inflation_rate / 100.0).powf(f64::from(year_offset))
}

fn guaranteed_income(profile: &HouseholdProfile, year_offset: u32, inflation: f64) -> f64 {
    let mut income = profile.other_monthly_income * 12.0;

    if profile.current_age.saturating_add(year_offset) >= profile.social_security_age {
        income += profile.social_security_monthly * 12.0 * inflation;
    }

    // A spouse with any unset (zero) field is treated as absent.
    if let Some(spouse) = profile.spouse.filter(|spouse| {
        spouse.current_age > 0
            && spouse.social_security_age > 0
            && spouse.social_security_monthly > 0.0
    }) {
        if spouse.current_age.saturating_add(year_offset) >= spouse.social_security_age {
            income += spouse.social_security_monthly * 12.0 * inflation;
        }
    }

    income
}

pub fn withdraw_waterfall(
    balances: BucketBalances,
    amount: f64,
) -> (BucketBalances, WithdrawalSource) {
    if balances.cash >= amount {
        return (
            BucketBalances {
                cash: balances.cash - amount,
                ..balances
            },
            WithdrawalSource::Cash,
        );
    }

    let remaining = amount - balances.cash;
    if balances.income >= remaining {
        return (
            BucketBalances {
                cash: 0.0,
                income: balances.income - remaining,
                growth: balances.growth,
            },
            WithdrawalSource::CashThenIncome,
        );
    }

    let remaining = remaining - balances.income;
    (
        BucketBalances {
            cash: 0.0,
            income: 0.0,
            growth: balances.growth - remaining,
        },
        WithdrawalSource::CashThenIncomeThenGrowth,
    )
}

pub fn apply_returns(balances: BucketBalances, policy: &BucketPolicy) -> BucketBalances {
    BucketBalances {
        cash: balances.cash * (1.0 + policy.cash_return / 100.0),
        income: balances.income * (1.0 + policy.income_return / 100.0),
        growth: balances.growth * (1.0 + policy.growth_return / 100.0),
    }
}

// Growth below the safety multiple is never tapped, even when income can't
// cover the shortfall either.
pub fn refill_cash(balances: BucketBalances, cash_target: f64) -> (BucketBalances, RebalanceAction) {
    if balances.cash >= cash_target {
        return (balances, RebalanceAction::None);
    }

    let shortfall = cash_target - balances.cash;
    if balances.growth > shortfall * GROWTH_REFILL_SAFETY_MULTIPLE {
        (
            BucketBalances {
                cash: balances.cash + shortfall,
                growth: balances.growth - shortfall,
                ..balances
            },
            RebalanceAction::RefillCashFromGrowth,
        )
    } else if balances.income > shortfall {
        (
            BucketBalances {
                cash: balances.cash + shortfall,
                income: balances.income - shortfall,
                ..balances
            },
            RebalanceAction::RefillCashFromIncome,
        )
    } else {
        (balances, RebalanceAction::None)
    }
}

pub fn summarize_projection(projections: &[YearlyProjection]) -> ProjectionSummary {
    let first_shortfall_age = projections
        .iter()
        .find(|p| p.end_balance_growth < 0.0)
        .map(|p| p.age);

    ProjectionSummary {
        years: projections.len(),
        final_total_portfolio: projections.last().map_or(0.0, |p| p.total_portfolio),
        first_shortfall_age,
        sustainable: first_shortfall_age.is_none(),
    }
}
