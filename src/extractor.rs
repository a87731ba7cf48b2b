// src/extractor.rs

use std::sync::Arc;

use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::{
    auth::verify_jwt,
    auth_models::{AdminClaims, Role, TokenClaims},
    errors::AppError,
    state::AppState,
};

impl FromRequestParts<Arc<AppState>> for TokenClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Sprawdza, czy nagłówek istnieje i czy jest poprawnym Bearer tokenem
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                tracing::warn!("Nie udało się odczytać nagłówka Bearer: {:?}", e);
                AppError::MissingToken("Brak lub niepoprawny nagłówek Authorization".into())
            })?;

        let claims = verify_jwt(bearer.token(), &state.jwt_secret).map_err(|e| {
            tracing::warn!("Nieprawidłowy token: {:?}", e);
            e
        })?;

        Ok(claims.claims)
    }
}

impl FromRequestParts<Arc<AppState>> for AdminClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = TokenClaims::from_request_parts(parts, state).await?;
        if claims.role != Role::Admin {
            tracing::warn!(
                "Użytkownik {} bez roli admin próbował dostać się do CMS",
                claims.sub
            );
            return Err(AppError::UnauthorizedAccess(
                "Dostęp tylko dla administratora".to_string(),
            ));
        }
        Ok(AdminClaims(claims))
    }
}
