use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use vigil_security::{dt_salted_hash, WindowedAuthorizer};

const SECRET: &str = "mysecretkey";

fn token_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap()
}

/// Every skew inside the window is accepted, and reported as the offset
/// between the token's clock and the verifier's.
#[test]
fn test_accepts_every_offset_within_window() -> Result<()> {
    let auth = WindowedAuthorizer::new(SECRET, 30)?;
    let token = dt_salted_hash(SECRET, &token_time());

    for skew in -30..=30 {
        let now = token_time() + Duration::seconds(skew);
        assert_eq!(
            auth.verify_detailed(&token, &now),
            Some(-skew),
            "skew {} should verify",
            skew
        );
    }
    Ok(())
}

#[test]
fn test_rejects_just_outside_window() -> Result<()> {
    let auth = WindowedAuthorizer::new(SECRET, 30)?;
    let token = dt_salted_hash(SECRET, &token_time());

    for skew in [31, -31, 45, -45, 3600] {
        let now = token_time() + Duration::seconds(skew);
        assert!(!auth.verify(&token, &now), "skew {} must not verify", skew);
    }
    Ok(())
}

#[test]
fn test_rejects_hash_from_other_secret() -> Result<()> {
    let auth = WindowedAuthorizer::new(SECRET, 30)?;
    let foreign = dt_salted_hash("not-the-secret", &token_time());
    assert!(!auth.verify(&foreign, &token_time()));
    Ok(())
}

#[test]
fn test_subsecond_clock_still_matches() -> Result<()> {
    let auth = WindowedAuthorizer::new(SECRET, 30)?;
    let token = dt_salted_hash(SECRET, &token_time());
    let now = token_time() + Duration::milliseconds(750);
    assert_eq!(auth.verify_detailed(&token, &now), Some(0));
    Ok(())
}

#[test]
fn test_challenge_roundtrips_through_verify() -> Result<()> {
    let auth = WindowedAuthorizer::new(SECRET, 5)?;
    let now = Utc::now();
    let token = auth.challenge(&now);
    assert!(auth.verify(&token, &now));
    Ok(())
}

#[test]
fn test_narrow_window() -> Result<()> {
    let auth = WindowedAuthorizer::new(SECRET, 1)?;
    let token = dt_salted_hash(SECRET, &token_time());
    assert!(auth.verify(&token, &(token_time() + Duration::seconds(1))));
    assert!(!auth.verify(&token, &(token_time() + Duration::seconds(2))));
    Ok(())
}
