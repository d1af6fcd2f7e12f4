//! Enroll a user tapping "SOS" and authenticate a genuine and a rushed attempt

use rhythm_auth::types::TimingSample;
use rhythm_auth::{authenticate_user, AuthConfig, MemoryProfileStore, Registration};

fn sample(dot: f64, dash: f64, gap: f64) -> TimingSample {
    TimingSample::new(
        vec![dot, dot, dot, dash, dash, dash, dot, dot, dot],
        vec![gap, gap, gap * 1.5, gap, gap, gap * 1.5, gap, gap],
    )
}

fn main() -> Result<(), rhythm_auth::ComputeError> {
    let config = AuthConfig::default();
    let mut store = MemoryProfileStore::new();

    let mut registration = Registration::new("alice", "... --- ...", config, &store)?;
    for dot in [0.10, 0.11, 0.095] {
        let outcome = registration.submit(&sample(dot, dot * 3.0, dot))?;
        println!(
            "attempt {}: {:?} quality={:.3} ({})",
            outcome.attempt,
            outcome.admission.status,
            outcome.admission.quality_score,
            outcome.quality.feedback()
        );
    }
    let record = registration.finish(&mut store)?;
    println!("enrolled {} as {}", record.username, record.user_id);

    let attempts = [
        ("genuine", sample(0.10, 0.30, 0.10)),
        ("rushed", sample(0.05, 0.40, 0.02)),
    ];
    for (label, attempt) in attempts {
        let result = authenticate_user(&store, "alice", &attempt, &config)?;
        println!(
            "{label}: granted={} distance={:.3} threshold={:.3} votes={}",
            result.final_decision,
            result.distance(),
            result.threshold(),
            result.vote_tally
        );
    }

    Ok(())
}
