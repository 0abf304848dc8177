use thiserror::Error;

use super::types::{BucketPolicy, Holding, HouseholdProfile};

pub const MAX_AGE: u32 = 150;

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("lifeExpectancy ({life_expectancy}) must be >= currentAge ({current_age})")]
    LifeExpectancyBeforeCurrentAge {
        current_age: u32,
        life_expectancy: u32,
    },

    #[error("{field} ({age}) must be <= {max}", max = MAX_AGE)]
    AgeOutOfRange { field: &'static str, age: u32 },

    #[error("{field} must be a finite amount >= 0")]
    InvalidAmount { field: &'static str },

    #[error("{field} must be a finite percentage > -100")]
    InvalidRate { field: &'static str },

    #[error("{field} must be a finite number of years > 0")]
    InvalidTargetYears { field: &'static str },

    #[error("holding {ticker} must have a finite quantity and price")]
    InvalidHolding { ticker: String },
}

pub fn validate_inputs(
    profile: &HouseholdProfile,
    policy: &BucketPolicy,
    holdings: &[Holding],
) -> Result<(), InputError> {
    validate_profile(profile)?;
    validate_policy(policy)?;

    if let Some(bad) = holdings
        .iter()
        .find(|h| !h.quantity.is_finite() || !h.current_price.is_finite())
    {
        return Err(InputError::InvalidHolding {
            ticker: bad.ticker.clone(),
        });
    }

    Ok(())
}

fn validate_profile(profile: &HouseholdProfile) -> Result<(), InputError> {
    let mut ages = vec![
        ("currentAge", profile.current_age),
        ("retirementAge", profile.retirement_age),
        ("lifeExpectancy", profile.life_expectancy),
        ("socialSecurityAge", profile.social_security_age),
    ];
    if let Some(spouse) = profile.spouse {
        ages.push(("spouseAge", spouse.current_age));
        ages.push(("spouseSocialSecurityAge", spouse.social_security_age));
    }
    if let Some((field, age)) = ages.into_iter().find(|(_, age)| *age > MAX_AGE) {
        return Err(InputError::AgeOutOfRange { field, age });
    }

    if profile.life_expectancy < profile.current_age {
        return Err(InputError::LifeExpectancyBeforeCurrentAge {
            current_age: profile.current_age,
            life_expectancy: profile.life_expectancy,
        });
    }

    let mut amounts = vec![
        ("monthlySpending", profile.monthly_spending),
        ("socialSecurityAmount", profile.social_security_monthly),
        ("otherIncome", profile.other_monthly_income),
    ];
    if let Some(spouse) = profile.spouse {
        amounts.push(("spouseSocialSecurityAmount", spouse.social_security_monthly));
    }
    for (field, amount) in amounts {
        check_amount(field, amount)?;
    }

    check_rate("inflationRate", profile.inflation_rate)
}

fn validate_policy(policy: &BucketPolicy) -> Result<(), InputError> {
    for (field, rate) in [
        ("cashReturn", policy.cash_return),
        ("incomeReturn", policy.income_return),
        ("growthReturn", policy.growth_return),
    ] {
        check_rate(field, rate)?;
    }

    for (field, years) in [
        ("cashTargetYears", policy.cash_target_years),
        ("incomeTargetYears", policy.income_target_years),
    ] {
        if !years.is_finite() || years <= 0.0 {
            return Err(InputError::InvalidTargetYears { field });
        }
    }

    Ok(())
}

fn check_amount(field: &'static str, amount: f64) -> Result<(), InputError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(InputError::InvalidAmount { field });
    }
    Ok(())
}

fn check_rate(field: &'static str, rate: f64) -> Result<(), InputError> {
    if !rate.is_finite() || rate <= -100.0 {
        return Err(InputError::InvalidRate { field });
    }
    Ok(())
}
