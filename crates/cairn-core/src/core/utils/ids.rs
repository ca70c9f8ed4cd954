use crate::core::models::key::SampleId;
use rand::Rng;

const ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LENGTH: usize = 10;

// Identifiers are `s` followed by ten base-36 characters. Collisions are
// improbable but not impossible; callers that mint identifiers against an
// existing store must check for them.
pub fn random_sample_id(rng: &mut impl Rng) -> SampleId {
    let mut id = String::with_capacity(ID_LENGTH + 1);
    id.push('s');
    for _ in 0..ID_LENGTH {
        let idx = rng.gen_range(0..ID_CHARSET.len());
        id.push(ID_CHARSET[idx] as char);
    }
    SampleId::new(id)
}

pub fn fresh_sample_id() -> SampleId {
    random_sample_id(&mut rand::thread_rng())
}
