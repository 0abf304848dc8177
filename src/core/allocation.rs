use std::collections::BTreeMap;

use serde::Serialize;

use super::types::{BucketPolicy, BucketTag, Holding, HouseholdProfile};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    pub cash: f64,
    pub income: f64,
    pub growth: f64,
    pub unassigned: f64,
    pub total: f64,
    pub yearly_spending: f64,
    pub cash_years: f64,
    pub income_years: f64,
    pub cash_target_years: f64,
    pub income_target_years: f64,
    pub cash_below_target: bool,
    pub income_below_target: bool,
    pub account_totals: BTreeMap<String, f64>,
    pub unassigned_tickers: Vec<String>,
}

/// Snapshot of today's holdings against the bucket targets. Coverage is
/// measured in years of current (uninflated) spending.
pub fn summarize_allocation(
    profile: &HouseholdProfile,
    policy: &BucketPolicy,
    holdings: &[Holding],
) -> AllocationSummary {
    let mut cash = 0.0;
    let mut income = 0.0;
    let mut growth = 0.0;
    let mut unassigned = 0.0;
    let mut account_totals = BTreeMap::new();
    let mut unassigned_tickers = Vec::new();

    for holding in holdings {
        let value = holding.market_value();
        match holding.bucket {
            BucketTag::Cash => cash += value,
            BucketTag::Income => income += value,
            BucketTag::Growth => growth += value,
            BucketTag::Unassigned => {
                unassigned += value;
                unassigned_tickers.push(holding.ticker.clone());
            }
        }
        *account_totals.entry(holding.account.clone()).or_insert(0.0) += value;
    }

    let yearly_spending = profile.monthly_spending * 12.0;
    let coverage = |balance: f64| {
        if yearly_spending > 0.0 {
            balance / yearly_spending
        } else {
            0.0
        }
    };
    let cash_years = coverage(cash);
    let income_years = coverage(income);

    AllocationSummary {
        cash,
        income,
        growth,
        unassigned,
        total: cash + income + growth + unassigned,
        yearly_spending,
        cash_years,
        income_years,
        cash_target_years: policy.cash_target_years,
        income_target_years: policy.income_target_years,
        cash_below_target: cash_years < policy.cash_target_years,
        income_below_target: income_years < policy.income_target_years,
        account_totals,
        unassigned_tickers,
    }
}
