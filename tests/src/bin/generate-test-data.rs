use cairn_api::{field, CollectionPath, Document, Fields, Time, Value};
use cairn_mock_server::{Seed, SeedDocument};
use chrono::{Duration, Utc};
use rand::{seq::SliceRandom, Rng};

const NUM_USERS: usize = 6;
const NUM_TRAILS: usize = 4;

const MAX_COMMENTS_PER_TRAIL: usize = 12;
const MAX_REPLIES_PER_COMMENT: usize = 5;
const COMMENT_WORD_COUNT: usize = 25;
const REPLY_WORD_COUNT: usize = 10;

/// Probability for a comment or reply to have been edited after creation
const EDIT_PROBABILITY: f64 = 0.2;

struct User {
    uid: String,
    name: String,
    avatar: Option<String>,
}

fn gen_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn gen_users(rng: &mut impl Rng) -> Vec<User> {
    (0..NUM_USERS)
        .map(|_| {
            let uid = gen_id();
            let avatar = match rng.gen_bool(0.5) {
                true => Some(format!("https://avatars.example.org/{uid}.png")),
                false => None,
            };
            User {
                uid,
                name: lipsum::lipsum_title(),
                avatar,
            }
        })
        .collect()
}

/// Fields of a comment or reply written by `author` at `created`, liked by a
/// random subset of `users`
fn gen_post(
    rng: &mut impl Rng,
    users: &[User],
    author: &User,
    words: usize,
    created: Time,
) -> Fields {
    let mut fields = Fields::new();
    fields.insert(field::TEXT.into(), Value::from(lipsum::lipsum_words(words)));
    fields.insert(field::AUTHOR_UID.into(), Value::from(author.uid.clone()));
    fields.insert(field::AUTHOR_NAME.into(), Value::from(author.name.clone()));
    fields.insert(field::PHOTO_URL.into(), Value::from(author.avatar.clone()));
    fields.insert(field::CREATED_AT.into(), Value::Timestamp(created));
    if rng.gen_bool(EDIT_PROBABILITY) {
        let edited = created + Duration::minutes(rng.gen_range(1..600));
        fields.insert(field::UPDATED_AT.into(), Value::Timestamp(edited));
    }
    let num_likes = rng.gen_range(0..=users.len());
    let likes = users
        .choose_multiple(rng, num_likes)
        .map(|u| Value::from(u.uid.clone()))
        .collect();
    fields.insert(field::LIKES.into(), Value::Array(likes));
    fields
}

fn main() {
    let mut rng = rand::thread_rng();
    let users = gen_users(&mut rng);
    let trails = CollectionPath::root("trails");
    let mut documents = Vec::new();

    for t in 0..NUM_TRAILS {
        // the first trail keeps a well-known id, handy for cairn-ctl --trail
        let trail = match t {
            0 => String::from("demo"),
            _ => gen_id(),
        };
        let comments = trails.doc(&trail).subcollection("comments");
        let mut date = Utc::now() - Duration::days(30);

        for _ in 0..rng.gen_range(0..=MAX_COMMENTS_PER_TRAIL) {
            date = date + Duration::minutes(rng.gen_range(1..2000));
            let id = gen_id();
            let author = &users[rng.gen_range(0..users.len())];
            let fields = gen_post(&mut rng, &users, author, COMMENT_WORD_COUNT, date);
            documents.push(SeedDocument {
                collection: comments.clone(),
                document: Document {
                    id: id.clone(),
                    fields,
                },
            });

            let replies = comments.doc(&id).subcollection("replies");
            let mut reply_date = date;
            for _ in 0..rng.gen_range(0..=MAX_REPLIES_PER_COMMENT) {
                reply_date = reply_date + Duration::minutes(rng.gen_range(1..300));
                let author = &users[rng.gen_range(0..users.len())];
                let mut fields = gen_post(&mut rng, &users, author, REPLY_WORD_COUNT, reply_date);
                // replies only get a likes field once somebody liked them
                if fields.get(field::LIKES) == Some(&Value::Array(Vec::new())) {
                    fields.remove(field::LIKES);
                }
                documents.push(SeedDocument {
                    collection: replies.clone(),
                    document: Document {
                        id: gen_id(),
                        fields,
                    },
                });
            }
        }
    }

    let seed = Seed { documents };
    println!(
        "{}",
        serde_json::to_string_pretty(&seed).expect("serializing seed data")
    );
}
