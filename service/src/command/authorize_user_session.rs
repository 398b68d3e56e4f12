//! [`Command`] for authorizing a [`User`] [`Session`].

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use jsonwebtoken::Validation;
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, session, Actor, Session},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for authorizing a [`User`] [`Session`].
///
/// Resolves the [`Actor`] all the other operations are performed by.
#[derive(Clone, Debug, From)]
pub struct AuthorizeUserSession {
    /// [`Session`] token to authorize.
    pub token: session::Token,
}

impl<Db, Gw> Command<AuthorizeUserSession> for Service<Db, Gw>
where
    Db: Database<
        Select<By<Option<User>, user::Id>>,
        Ok = Option<User>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Actor;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AuthorizeUserSession,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AuthorizeUserSession { token } = cmd;

        let session = jsonwebtoken::decode::<Session>(
            token.as_ref(),
            &self.config().jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(tracerr::from_and_wrap!(=> E))?
        .claims;

        let user = self
            .database()
            .execute(Select(By::new(session.user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::UserNotExists(session.user_id))
            .map_err(tracerr::wrap!())?;

        Ok(user.actor())
    }
}

/// Error of [`AuthorizeUserSession`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`jsonwebtoken`] decoding error.
    #[display("Failed to decode a JSON Web Token: {_0}")]
    JsonWebTokenDecodeError(jsonwebtoken::errors::Error),

    /// [`User`] the [`Session`] belongs to does not exist.
    #[display("`User(id: {_0})` does not exist")]
    #[from(ignore)]
    UserNotExists(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use common::DateTime;
    use jsonwebtoken::{EncodingKey, Header};

    use crate::{
        domain::user::{self, session, Session},
        fixture,
    };

    use super::{AuthorizeUserSession, Command as _, ExecutionError};

    #[expect(unsafe_code, reason = "test tokens are well-formed")]
    fn token(user_id: user::Id, secret: &[u8]) -> session::Token {
        let session = Session {
            user_id,
            expires_at: (DateTime::now() + std::time::Duration::from_secs(60))
                .coerce(),
        };
        let jwt = jsonwebtoken::encode(
            &Header::default(),
            &session,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        unsafe { session::Token::new_unchecked(jwt) }
    }

    #[tokio::test]
    async fn resolves_actor() {
        let w = fixture::world().await;

        let actor = w
            .service
            .execute(AuthorizeUserSession {
                token: token(w.customer.id, fixture::JWT_SECRET),
            })
            .await
            .unwrap();

        assert_eq!(actor, w.customer);
    }

    #[tokio::test]
    async fn rejects_foreign_signature() {
        let w = fixture::world().await;

        let err = w
            .service
            .execute(AuthorizeUserSession {
                token: token(w.customer.id, b"another secret"),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::JsonWebTokenDecodeError(_),
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_user() {
        let w = fixture::world().await;
        let ghost = user::Id::new();

        let err = w
            .service
            .execute(AuthorizeUserSession {
                token: token(ghost, fixture::JWT_SECRET),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::UserNotExists(id) if *id == ghost,
        ));
    }
}
