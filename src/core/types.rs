use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketTag {
    Cash,
    Income,
    Growth,
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub ticker: String,
    #[serde(default)]
    pub account: String,
    pub quantity: f64,
    pub current_price: f64,
    pub bucket: BucketTag,
}

impl Holding {
    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpouseProfile {
    pub current_age: u32,
    pub social_security_age: u32,
    pub social_security_monthly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdProfile {
    pub current_age: u32,
    pub retirement_age: u32,
    /// Terminal age, inclusive.
    pub life_expectancy: u32,
    pub monthly_spending: f64,
    /// Percent per year.
    pub inflation_rate: f64,
    pub social_security_age: u32,
    pub social_security_monthly: f64,
    pub spouse: Option<SpouseProfile>,
    /// Pension or annuity income, paid flat (never inflated).
    pub other_monthly_income: f64,
}

impl HouseholdProfile {
    pub fn projection_years(&self) -> usize {
        if self.life_expectancy < self.current_age {
            0
        } else {
            (self.life_expectancy - self.current_age) as usize + 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPolicy {
    pub cash_return: f64,
    pub income_return: f64,
    pub growth_return: f64,
    pub cash_target_years: f64,
    pub income_target_years: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketBalances {
    pub cash: f64,
    pub income: f64,
    pub growth: f64,
}

impl BucketBalances {
    pub fn from_holdings(holdings: &[Holding]) -> Self {
        holdings
            .iter()
            .fold(Self::default(), |mut acc, holding| {
                match holding.bucket {
                    BucketTag::Cash => acc.cash += holding.market_value(),
                    BucketTag::Income => acc.income += holding.market_value(),
                    BucketTag::Growth => acc.growth += holding.market_value(),
                    BucketTag::Unassigned => {}
                }
                acc
            })
    }

    pub fn total(self) -> f64 {
        self.cash + self.income + self.growth
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(into = "String")]
pub enum WithdrawalSource {
    Cash,
    CashThenIncome,
    CashThenIncomeThenGrowth,
}

impl WithdrawalSource {
    pub fn label(self) -> &'static str {
        match self {
            WithdrawalSource::Cash => "Cash Bucket",
            WithdrawalSource::CashThenIncome => "Cash (Depleted) -> Income",
            WithdrawalSource::CashThenIncomeThenGrowth => "Cash -> Income -> Growth",
        }
    }
}

impl fmt::Display for WithdrawalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<WithdrawalSource> for String {
    fn from(value: WithdrawalSource) -> Self {
        value.label().to_string()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(into = "String")]
pub enum RebalanceAction {
    None,
    RefillCashFromGrowth,
    RefillCashFromIncome,
}

impl RebalanceAction {
    pub fn label(self) -> &'static str {
        match self {
            RebalanceAction::None => "",
            RebalanceAction::RefillCashFromGrowth => "Refill Cash from Growth",
            RebalanceAction::RefillCashFromIncome => "Refill Cash from Income",
        }
    }
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<RebalanceAction> for String {
    fn from(value: RebalanceAction) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyProjection {
    pub year: i32,
    pub age: u32,
    pub spending_need: f64,
    pub income: f64,
    pub withdrawal_needed: f64,
    pub start_balance_cash: f64,
    pub start_balance_income: f64,
    pub start_balance_growth: f64,
    pub end_balance_cash: f64,
    pub end_balance_income: f64,
    pub end_balance_growth: f64,
    pub total_portfolio: f64,
    pub withdrawal_source: WithdrawalSource,
    pub action: RebalanceAction,
}

impl YearlyProjection {
    pub fn start_balances(&self) -> BucketBalances {
        BucketBalances {
            cash: self.start_balance_cash,
            income: self.start_balance_income,
            growth: self.start_balance_growth,
        }
    }

    pub fn end_balances(&self) -> BucketBalances {
        BucketBalances {
            cash: self.end_balance_cash,
            income: self.end_balance_income,
            growth: self.end_balance_growth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub years: usize,
    pub final_total_portfolio: f64,
    pub first_shortfall_age: Option<u32>,
    pub sustainable: bool,
}
